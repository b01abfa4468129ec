//! Speech synthesis

use async_trait::async_trait;

use crate::{Error, Result};

/// Turns reply text into audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// `OpenAI` TTS synthesizer with a fixed voice and speed
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
}

impl OpenAiSynthesizer {
    /// Create a synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String, voice: String, speed: f32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for synthesis".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            voice,
            speed,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        tracing::debug!(chars = text.len(), voice = %self.voice, "starting synthesis");

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "synthesis API error");
            return Err(Error::Tts(format!("synthesis API error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}
