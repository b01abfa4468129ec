//! Configuration for the Uli assistant
//!
//! Everything is read from `ULI_*` environment variables with defaults that
//! match the reference deployment (Spanish voice, local generation backend).

use crate::{Error, Result};

/// Default wake phrase that activates dictation
pub const DEFAULT_WAKE_PHRASE: &str = "hola uli";

/// Default generation backend endpoint
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001/api/openai";

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake phrase, lowercased and trimmed
    pub wake_phrase: String,

    /// Spoken language for recognition (ISO 639-1, fixed for the widget)
    pub language: String,

    /// Generation backend endpoint
    pub backend_url: String,

    /// Voice processing configuration
    pub voice: VoiceConfig,

    /// Re-arm continuous wake listening whenever the widget returns to idle
    pub resume_wake: bool,
}

/// Voice processing configuration
#[derive(Debug, Clone, Default)]
pub struct VoiceConfig {
    /// Enable microphone capture and playback
    pub enabled: bool,

    /// `OpenAI` API key for STT and TTS
    pub openai_api_key: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if the configured wake phrase is empty
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with an explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if the configured wake phrase is empty
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let wake_phrase = normalize_phrase(
            &std::env::var("ULI_WAKE_PHRASE").unwrap_or_else(|_| DEFAULT_WAKE_PHRASE.to_string()),
        );
        if wake_phrase.is_empty() {
            return Err(Error::Config("wake phrase must not be empty".to_string()));
        }

        let language = std::env::var("ULI_LANGUAGE").unwrap_or_else(|_| "es".to_string());

        let backend_url =
            std::env::var("ULI_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let voice = VoiceConfig {
            enabled: !disable_voice,
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            stt_model: std::env::var("ULI_STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string()),
            tts_model: std::env::var("ULI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            tts_voice: std::env::var("ULI_TTS_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            tts_speed: std::env::var("ULI_TTS_SPEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        };

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        let resume_wake = std::env::var("ULI_RESUME_WAKE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Ok(Self {
            wake_phrase,
            language,
            backend_url,
            voice,
            resume_wake,
        })
    }
}

/// Lowercase and trim a wake phrase
fn normalize_phrase(phrase: &str) -> String {
    phrase.to_lowercase().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phrase() {
        assert_eq!(normalize_phrase("  Hola Uli  "), "hola uli");
        assert_eq!(normalize_phrase("HOLA ULI"), "hola uli");
        assert_eq!(normalize_phrase("   "), "");
    }
}
