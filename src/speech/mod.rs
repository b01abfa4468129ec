//! Speech input and output
//!
//! The native rendition of the browser speech APIs the widget was born on:
//! microphone capture, utterance segmentation, HTTP recognition and
//! synthesis, speaker playback.

mod capture;
mod playback;
mod segment;
mod stt;
mod tts;

pub use capture::{Microphone, SAMPLE_RATE, samples_to_wav};
pub use playback::{PLAYBACK_SAMPLE_RATE, Speaker};
pub use segment::UtteranceSegmenter;
pub use stt::{Transcriber, WhisperTranscriber};
pub use tts::{OpenAiSynthesizer, Synthesizer};
