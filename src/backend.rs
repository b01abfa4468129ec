//! Generation backend client
//!
//! The widget forwards recognized text to one HTTP endpoint and speaks back
//! whatever it returns. `{"prompt"}` in, `{"text"}` out, no timeout and no
//! retry: a hung backend parks the cycle in Thinking until a newer session
//! aborts the request task.

use async_trait::async_trait;

use crate::{Error, Result};

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Produces a reply for a recognized prompt
#[async_trait]
pub trait ResponseBackend: Send + Sync {
    /// Generate a reply for the prompt
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable, rejects the request, or
    /// replies with an unparseable body
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for the generation endpoint
pub struct BackendClient {
    client: reqwest::Client,
    url: String,
}

impl BackendClient {
    /// Create a client for the given endpoint
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl ResponseBackend for BackendClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::debug!(url = %self.url, chars = prompt.len(), "requesting reply");

        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "backend request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "backend error");
            return Err(Error::Backend(format!("backend error {status}: {body}")));
        }

        let result: GenerateResponse = response.json().await?;
        tracing::debug!(chars = result.text.len(), "reply received");
        Ok(result.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let body = serde_json::to_value(GenerateRequest { prompt: "hola" }).unwrap();
        assert_eq!(body, serde_json::json!({ "prompt": "hola" }));
    }

    #[test]
    fn test_response_wire_shape() {
        let reply: GenerateResponse = serde_json::from_str(r#"{"text":"buenas"}"#).unwrap();
        assert_eq!(reply.text, "buenas");

        // Extra fields are tolerated
        let reply: GenerateResponse =
            serde_json::from_str(r#"{"text":"ok","model":"x"}"#).unwrap();
        assert_eq!(reply.text, "ok");
    }
}
