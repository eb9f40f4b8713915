use async_trait::async_trait;
use std::sync::Arc;

use crate::config::CompletionSettings;
use crate::error::Result;
use crate::models::{CatalogRow, ChatMessage, ChatRequest, Intent, format_amount};
use crate::prompts::{self, FALLBACK_HEADER, NO_CANDIDATES_MESSAGE};
use crate::transport::{Transport, complete};

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Always produces user-facing text; falls back to `fallback_listing`.
    async fn synthesize(&self, intent: &Intent, results: &[CatalogRow]) -> String;
}

pub struct GroqSynth {
    tx: Arc<dyn Transport>,
    settings: CompletionSettings,
}

impl GroqSynth {
    pub fn new(tx: Arc<dyn Transport>, settings: CompletionSettings) -> Self {
        Self { tx, settings }
    }

    async fn summarize(&self, intent: &Intent, results: &[CatalogRow]) -> Result<String> {
        let intent_json = serde_json::to_string(intent)?;
        let rows_json = serde_json::to_string_pretty(results)?;

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage::system(prompts::REPLY_SYSTEM_PROMPT),
                ChatMessage::user(prompts::reply_user_prompt(&intent_json, &rows_json)),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: None,
        };

        complete(self.tx.as_ref(), &request, self.settings.timeout).await
    }
}

#[async_trait]
impl Synthesizer for GroqSynth {
    async fn synthesize(&self, intent: &Intent, results: &[CatalogRow]) -> String {
        if results.is_empty() {
            return NO_CANDIDATES_MESSAGE.to_string();
        }

        match self.summarize(intent, results).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Reply synthesis failed, sending templated listing: {e}");
                fallback_listing(results)
            }
        }
    }
}

/// Deterministic reply built from the rows alone.
///
/// One `<name> | <color> | <size> ct | $<price>` line per row under a fixed
/// header. Absent fields render as `-`.
pub fn fallback_listing(results: &[CatalogRow]) -> String {
    let mut lines = Vec::with_capacity(results.len() + 1);
    lines.push(FALLBACK_HEADER.to_string());
    lines.extend(results.iter().map(listing_line));
    lines.join("\n")
}

fn listing_line(row: &CatalogRow) -> String {
    let name = if row.name.trim().is_empty() {
        "-"
    } else {
        row.name.trim()
    };
    let color = row.color.as_deref().unwrap_or("-");
    let size = row.size.as_deref().map(strip_carat_unit).unwrap_or("-");
    let price = match (row.price_value(), row.price.as_deref()) {
        (Some(value), _) => format_amount(value),
        (None, Some(raw)) => raw.to_string(),
        (None, None) => "-".to_string(),
    };
    format!("{name} | {color} | {size} ct | ${price}")
}

fn strip_carat_unit(size: &str) -> &str {
    let trimmed = size.trim();
    let lower = trimmed.to_ascii_lowercase();
    for unit in ["carats", "carat", "ct"] {
        if lower.ends_with(unit) {
            let stripped = trimmed[..trimmed.len() - unit.len()].trim_end();
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConciergeError;
    use crate::transport::MockTransport;
    use crate::transport::test_support::{StalledTransport, response_with};
    use std::time::Duration;

    fn settings(timeout: Duration) -> CompletionSettings {
        CompletionSettings {
            model: "reply-model".to_string(),
            max_tokens: 400,
            temperature: 0.4,
            timeout,
        }
    }

    fn pink_spinel() -> CatalogRow {
        CatalogRow {
            name: "Pink Spinel".to_string(),
            color: Some("pink".to_string()),
            size: Some("1.5".to_string()),
            price: Some("1200".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_results_skip_the_model() {
        let mut tx = MockTransport::new();
        tx.expect_chat().times(0);
        let synth = GroqSynth::new(Arc::new(tx), settings(Duration::from_secs(1)));

        let reply = synth.synthesize(&Intent::default(), &[]).await;
        assert_eq!(reply, NO_CANDIDATES_MESSAGE);
    }

    #[tokio::test]
    async fn model_text_is_returned_trimmed() {
        let mut tx = MockTransport::new();
        tx.expect_chat()
            .withf(|req| {
                req.model == "reply-model"
                    && req.response_format.is_none()
                    && req.messages[1].content.contains("Pink Spinel")
                    && req.messages[1].content.contains(r#""color":"pink""#)
            })
            .times(1)
            .returning(|_| Ok(response_with("\n  Pink Spinel, 1.5 ct, a vivid pink for $1200.  \n")));
        let synth = GroqSynth::new(Arc::new(tx), settings(Duration::from_secs(1)));
        let intent = Intent {
            color: Some("pink".to_string()),
            ..Default::default()
        };

        let reply = synth.synthesize(&intent, &[pink_spinel()]).await;
        assert_eq!(reply, "Pink Spinel, 1.5 ct, a vivid pink for $1200.");
    }

    #[tokio::test]
    async fn timeout_falls_back_to_listing() {
        let synth = GroqSynth::new(
            Arc::new(StalledTransport),
            settings(Duration::from_millis(20)),
        );

        let reply = synth.synthesize(&Intent::default(), &[pink_spinel()]).await;
        assert_eq!(
            reply,
            format!("{FALLBACK_HEADER}\nPink Spinel | pink | 1.5 ct | $1200")
        );
    }

    #[tokio::test]
    async fn error_or_blank_text_falls_back_to_listing() {
        let rows = vec![pink_spinel()];

        let mut tx = MockTransport::new();
        tx.expect_chat()
            .returning(|_| Err(ConciergeError::Upstream("503".to_string())));
        let synth = GroqSynth::new(Arc::new(tx), settings(Duration::from_secs(1)));
        assert_eq!(
            synth.synthesize(&Intent::default(), &rows).await,
            fallback_listing(&rows)
        );

        let mut tx = MockTransport::new();
        tx.expect_chat().returning(|_| Ok(response_with("  ")));
        let synth = GroqSynth::new(Arc::new(tx), settings(Duration::from_secs(1)));
        assert_eq!(
            synth.synthesize(&Intent::default(), &rows).await,
            fallback_listing(&rows)
        );
    }

    #[test]
    fn listing_renders_missing_and_raw_fields() {
        let rows = vec![
            CatalogRow {
                name: "Opal".to_string(),
                price: Some("on request".to_string()),
                ..Default::default()
            },
            CatalogRow {
                name: "Ruby".to_string(),
                color: Some("red".to_string()),
                size: Some("2.05 ct".to_string()),
                price: Some("$9,000.50".to_string()),
                ..Default::default()
            },
        ];
        assert_eq!(
            fallback_listing(&rows),
            format!(
                "{FALLBACK_HEADER}\nOpal | - | - ct | $on request\nRuby | red | 2.05 ct | $9000.5"
            )
        );
    }

    #[test]
    fn listing_is_reproducible() {
        let rows = vec![pink_spinel(), pink_spinel()];
        assert_eq!(fallback_listing(&rows), fallback_listing(&rows));
    }

    #[test]
    fn carat_units_are_not_repeated() {
        assert_eq!(strip_carat_unit("1.5"), "1.5");
        assert_eq!(strip_carat_unit("1.5ct"), "1.5");
        assert_eq!(strip_carat_unit("2 Carats"), "2");
        assert_eq!(strip_carat_unit("ct"), "ct");
    }
}
