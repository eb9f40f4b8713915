use async_trait::async_trait;
use std::sync::Arc;

use crate::config::CompletionSettings;
use crate::error::{ConciergeError, Result};
use crate::models::{ChatMessage, ChatRequest, Intent};
use crate::prompts;
use crate::transport::{Transport, complete};

#[async_trait]
pub trait IntentParser: Send + Sync {
    /// Best-effort interpretation. Returns the empty intent on any failure.
    async fn parse(&self, query: &str) -> Intent;
}

pub struct GroqIntent {
    tx: Arc<dyn Transport>,
    settings: CompletionSettings,
}

impl GroqIntent {
    pub fn new(tx: Arc<dyn Transport>, settings: CompletionSettings) -> Self {
        Self { tx, settings }
    }

    fn request(&self, query: &str) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage::system(prompts::INTENT_SYSTEM_PROMPT),
                ChatMessage::user(prompts::intent_user_prompt(query)),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        }
    }

    async fn try_parse(&self, query: &str) -> Result<Intent> {
        let request = self.request(query);
        let raw = complete(self.tx.as_ref(), &request, self.settings.timeout).await?;
        parse_intent_payload(&raw)
    }
}

#[async_trait]
impl IntentParser for GroqIntent {
    async fn parse(&self, query: &str) -> Intent {
        match self.try_parse(query).await {
            Ok(intent) => {
                tracing::debug!(?intent, "intent parsed");
                intent
            }
            Err(e) => {
                tracing::warn!("Intent parsing failed, continuing without filters: {e}");
                Intent::default()
            }
        }
    }
}

/// Decode the model's payload into an `Intent`.
///
/// Prose or code fences around the object are ignored; anything that is not a
/// JSON object is rejected.
pub fn parse_intent_payload(raw: &str) -> Result<Intent> {
    let json = extract_json_object(raw).ok_or_else(|| {
        ConciergeError::MalformedModelOutput(format!("no JSON object in intent payload: {raw}"))
    })?;
    serde_json::from_str(json).map_err(|e| {
        ConciergeError::MalformedModelOutput(format!(
            "Failed to deserialize intent JSON: {e}. Raw: {raw}"
        ))
    })
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
