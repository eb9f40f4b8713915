use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

use crate::error::{ConciergeError, Result};
use crate::models::{ChatRequest, ChatResponse};

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;
}

/// OpenAI-compatible chat completions client. Single attempt per call.
pub struct GroqTransport {
    client: Client,
    api_url: String,
    api_key: String,
}

impl GroqTransport {
    pub fn new(api_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl Transport for GroqTransport {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                ConciergeError::Upstream(format!("Failed to send completion request: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConciergeError::Upstream(format!(
                "Completion API returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            ConciergeError::MalformedModelOutput(format!(
                "Failed to parse completion response: {e}"
            ))
        })
    }
}

/// Stand-in used when no completion API key is configured. Every call fails
/// immediately so the pipeline takes its fallback paths.
pub struct UnavailableTransport;

#[async_trait]
impl Transport for UnavailableTransport {
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        Err(ConciergeError::Upstream(
            "no completion API key configured".to_string(),
        ))
    }
}

/// Run one completion under a hard deadline and return its trimmed text.
///
/// Timeouts, transport errors, a missing choice and blank content all count
/// as failure. No retries.
pub async fn complete(tx: &dyn Transport, req: &ChatRequest, timeout: Duration) -> Result<String> {
    let started = Instant::now();
    let response = tokio::time::timeout(timeout, tx.chat(req))
        .await
        .map_err(|_| ConciergeError::Timeout(timeout.as_millis()))??;

    tracing::debug!(
        model = %req.model,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "completion returned"
    );

    let text = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| {
            ConciergeError::MalformedModelOutput("completion returned no choices".to_string())
        })?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ConciergeError::MalformedModelOutput(
            "completion returned empty content".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::ChatMessage;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::user("hello")],
            temperature: 0.0,
            max_tokens: 16,
            response_format: None,
        }
    }

    #[tokio::test]
    async fn complete_trims_content() {
        let mut tx = MockTransport::new();
        tx.expect_chat()
            .times(1)
            .returning(|_| Ok(response_with("  hi there \n")));

        let text = complete(&tx, &request(), Duration::from_secs(1))
            .await
            .expect("completion should succeed");
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn complete_rejects_blank_and_missing_choices() {
        let mut tx = MockTransport::new();
        tx.expect_chat().returning(|_| Ok(response_with("   ")));
        let err = complete(&tx, &request(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::MalformedModelOutput(_)));

        let mut tx = MockTransport::new();
        tx.expect_chat()
            .returning(|_| Ok(ChatResponse { choices: vec![] }));
        let err = complete(&tx, &request(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::MalformedModelOutput(_)));
    }

    #[tokio::test]
    async fn complete_times_out() {
        let err = complete(&StalledTransport, &request(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Timeout(20)));
    }

    #[tokio::test]
    async fn unavailable_transport_fails_fast() {
        let err = complete(&UnavailableTransport, &request(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Upstream(_)));
    }
}
