//! Speaker playback
//!
//! Playback is blocking by design: the daemon runs it on a blocking task and
//! turns its return into the playback-finished event.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches the TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays audio on the default output device
pub struct Speaker {
    device: Device,
    config: StreamConfig,
}

impl Speaker {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device exists or no usable configuration
    /// is supported
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: stereo, duplicating the mono signal
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "speaker opened"
        );

        Ok(Self { device, config })
    }

    /// Decode MP3 bytes and play them to completion
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3: &[u8]) -> Result<()> {
        let samples = decode_mp3(mp3)?;
        self.play_samples(samples)
    }

    /// Play f32 samples to completion, blocking the calling thread
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let total = samples.len();

        let finished = Arc::new(AtomicBool::new(false));
        let finished_cb = Arc::clone(&finished);
        let mut pos = 0usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = if pos < samples.len() {
                            let s = samples[pos];
                            pos += 1;
                            s
                        } else {
                            finished_cb.store(true, Ordering::Relaxed);
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "speaker stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Wait out the audio, with a margin in case the device stalls
        let duration_ms = (total as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let timeout = std::time::Duration::from_millis(duration_ms + 500);
        let start = std::time::Instant::now();

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        // Let the tail drain before tearing the stream down
        std::thread::sleep(std::time::Duration::from_millis(100));
        drop(stream);

        tracing::debug!(samples = total, "playback complete");
        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average the channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
