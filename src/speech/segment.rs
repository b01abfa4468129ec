//! Utterance segmentation
//!
//! Slices the continuous capture stream into discrete utterances by RMS
//! energy: an utterance opens when a chunk rises above the energy threshold
//! and closes after a trailing silence window. The browser recognizer the
//! widget grew out of did this implicitly; here it is explicit so both wake
//! monitoring and dictation can share one microphone stream.

/// Minimum RMS energy for a chunk to count as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum voiced length for an utterance to be emitted (samples at 16kHz)
const MIN_UTTERANCE_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that closes an utterance (samples at 16kHz)
const TRAILING_SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Quiet,
    Voiced,
}

/// Splits a continuous sample stream into discrete utterances
#[derive(Debug)]
pub struct UtteranceSegmenter {
    phase: Phase,
    buffer: Vec<f32>,
    silence: usize,
}

impl UtteranceSegmenter {
    /// Create a segmenter waiting for speech
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Quiet,
            buffer: Vec::new(),
            silence: 0,
        }
    }

    /// Feed captured samples
    ///
    /// Returns a completed utterance when this chunk closes one. Chunks are
    /// classified whole, so callers should feed blocks of roughly 100ms.
    pub fn feed(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = rms_energy(samples);
        let voiced = energy > ENERGY_THRESHOLD;

        match self.phase {
            Phase::Quiet => {
                if voiced {
                    self.phase = Phase::Voiced;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "utterance started");
                }
                None
            }
            Phase::Voiced => {
                self.buffer.extend_from_slice(samples);
                if voiced {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.silence >= TRAILING_SILENCE_SAMPLES {
                    return self.close();
                }
                None
            }
        }
    }

    /// Close any utterance in progress, returning it if long enough
    ///
    /// Called when dictation stops so speech cut off mid-utterance is still
    /// recognized.
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        match self.phase {
            Phase::Quiet => None,
            Phase::Voiced => self.close(),
        }
    }

    /// Drop any buffered audio and wait for speech again
    pub fn reset(&mut self) {
        self.phase = Phase::Quiet;
        self.buffer.clear();
        self.silence = 0;
    }

    fn close(&mut self) -> Option<Vec<f32>> {
        let utterance = std::mem::take(&mut self.buffer);
        let voiced_len = utterance.len().saturating_sub(self.silence);
        self.phase = Phase::Quiet;
        self.silence = 0;

        if voiced_len < MIN_UTTERANCE_SAMPLES {
            tracing::trace!(voiced_len, "utterance too short, discarded");
            return None;
        }
        tracing::debug!(samples = utterance.len(), "utterance complete");
        Some(utterance)
    }
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS energy of a sample chunk
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
