//! Speech recognition
//!
//! Recognition happens over HTTP; the widget is pinned to a single spoken
//! language, so the language code rides along on every request.

use async_trait::async_trait;

use crate::{Error, Result};

/// Response from the `OpenAI` transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Turns a captured utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if the recognition service fails
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Whisper-backed transcriber
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: String,
}

impl WhisperTranscriber {
    /// Create a transcriber pinned to the given language
    ///
    /// # Arguments
    ///
    /// * `api_key` - `OpenAI` API key
    /// * `model` - Transcription model (e.g. "whisper-1")
    /// * `language` - ISO 639-1 language code (e.g. "es")
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String, language: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for transcription".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
