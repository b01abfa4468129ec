//! Microphone capture

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for capture (16kHz for speech recognition)
pub const SAMPLE_RATE: u32 = 16000;

/// Captures audio from the default input device into a shared buffer
///
/// The cpal stream is not `Send`, so a `Microphone` must be created, polled,
/// and dropped on the same task.
pub struct Microphone {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl Microphone {
    /// Whether a default input device is present at all
    #[must_use]
    pub fn probe() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no input device exists or no mono 16kHz
    /// configuration is supported
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing
    ///
    /// Idempotent: a running stream is left alone.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("capture started");
        Ok(())
    }

    /// Stop capturing and discard anything still buffered
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture stopped");
        }
        self.clear();
    }

    /// Samples captured since the last call, draining the buffer
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Discard buffered samples without stopping
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Whether the stream is running
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Encode f32 samples as 16-bit mono WAV bytes for the transcription API
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_length() {
        let samples = vec![0.0f32; 160];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header plus two bytes per sample
        assert_eq!(wav.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn test_wav_clamps_out_of_range_samples() {
        let wav = samples_to_wav(&[2.0, -2.0], SAMPLE_RATE).unwrap();
        let hi = i16::from_le_bytes([wav[44], wav[45]]);
        let lo = i16::from_le_bytes([wav[46], wav[47]]);
        assert_eq!(hi, 32767);
        assert_eq!(lo, -32768);
    }
}
