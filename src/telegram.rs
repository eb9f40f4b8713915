//! Long-polling Telegram front end. Receives text messages, runs each one
//! through the pipeline on its own task and sends the reply back.

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ConciergeService;
use crate::error::{ConciergeError, Result};
use crate::models::Reply;
use crate::prompts;

/// Telegram rejects photo captions longer than this.
pub const MAX_CAPTION_CHARS: usize = 1024;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Refresh,
    Query(&'a str),
}

/// Classify an incoming text. Unknown slash commands are treated as queries.
pub fn parse_command(text: &str) -> Command<'_> {
    let text = text.trim();
    let head = text.split_whitespace().next().unwrap_or_default();
    // commands in groups arrive as /start@BotName
    let command = head.split('@').next().unwrap_or_default();
    match command {
        "/start" | "/help" => Command::Start,
        "/refresh" => Command::Refresh,
        _ => Command::Query(text),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outgoing<'a> {
    Photo {
        url: &'a str,
        caption: Option<&'a str>,
    },
    Text(&'a str),
}

/// Decide which API calls deliver a reply: a captioned photo when the text
/// fits, otherwise a bare photo followed by the text.
pub fn plan_delivery(reply: &Reply) -> Vec<Outgoing<'_>> {
    match reply.image_url.as_deref() {
        None => vec![Outgoing::Text(&reply.text)],
        Some(url) if reply.text.chars().count() <= MAX_CAPTION_CHARS => vec![Outgoing::Photo {
            url,
            caption: Some(&reply.text),
        }],
        Some(url) => vec![
            Outgoing::Photo { url, caption: None },
            Outgoing::Text(&reply.text),
        ],
    }
}

pub struct TelegramBot {
    client: Client,
    base_url: String,
    poll_timeout_secs: u64,
}

impl TelegramBot {
    pub fn new(api_base: &str, token: &str, poll_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs.saturating_add(10)))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            poll_timeout_secs,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(&body)
            .send()
            .await
            // the URL embeds the bot token
            .map_err(|e| ConciergeError::Upstream(format!("Telegram {method} failed: {}", e.without_url())))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ConciergeError::Upstream(format!("Telegram {method} returned bad JSON: {}", e.without_url())))?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ConciergeError::Upstream(format!(
                "Telegram {method} rejected: {}",
                parsed.description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({"chat_id": chat_id, "text": text}))
            .await?;
        Ok(())
    }

    pub async fn send_photo(&self, chat_id: i64, url: &str, caption: Option<&str>) -> Result<()> {
        let mut body = json!({"chat_id": chat_id, "photo": url});
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        let _: serde_json::Value = self.call("sendPhoto", body).await?;
        Ok(())
    }

    /// Send a reply, falling back to plain text if the photo is rejected.
    pub async fn send_reply(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        for step in plan_delivery(reply) {
            match step {
                Outgoing::Photo { url, caption } => {
                    if let Err(e) = self.send_photo(chat_id, url, caption).await {
                        warn!("Photo reply failed, sending text only: {e}");
                        if caption.is_some() {
                            self.send_message(chat_id, &reply.text).await?;
                        }
                    }
                }
                Outgoing::Text(text) => self.send_message(chat_id, text).await?,
            }
        }
        Ok(())
    }

    async fn dispatch(&self, service: &ConciergeService, chat_id: i64, text: &str) -> Result<()> {
        match parse_command(text) {
            Command::Start => self.send_message(chat_id, prompts::GREETING_MESSAGE).await,
            Command::Refresh => {
                let notice = match service.catalog().refresh().await {
                    Ok(rows) => {
                        info!(rows, "Catalog reloaded on request");
                        prompts::REFRESH_OK_MESSAGE
                    }
                    Err(e) => {
                        warn!("On-demand catalog refresh failed: {e}");
                        prompts::REFRESH_FAILED_MESSAGE
                    }
                };
                self.send_message(chat_id, notice).await
            }
            Command::Query(query) => {
                let reply = service.handle(query).await;
                self.send_reply(chat_id, &reply).await
            }
        }
    }

    /// Poll for updates forever, handling each message on its own task.
    pub async fn run(self: Arc<Self>, service: Arc<ConciergeService>) -> Result<()> {
        info!("Telegram long polling started");
        let mut offset = 0;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("getUpdates failed: {e}");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(Message {
                    message_id,
                    chat,
                    text: Some(text),
                }) = update.message
                else {
                    continue;
                };
                debug!(message_id, chat_id = chat.id, "Message received");

                let bot = Arc::clone(&self);
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    if let Err(e) = bot.dispatch(&service, chat.id, &text).await {
                        warn!(chat_id = chat.id, "Failed to deliver reply: {e}");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_get_updates_payload() {
        let raw = r#"{
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 42, "type": "private"}, "text": "pink spinel"}},
                {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 42}, "photo": []}},
                {"update_id": 12, "edited_message": {"message_id": 1, "chat": {"id": 42}}}
            ]
        }"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = parsed.result.unwrap();
        assert_eq!(updates.len(), 3);
        let first = updates[0].message.as_ref().unwrap();
        assert_eq!(first.chat.id, 42);
        assert_eq!(first.text.as_deref(), Some("pink spinel"));
        assert!(updates[1].message.as_ref().unwrap().text.is_none());
        assert!(updates[2].message.is_none());
    }

    #[test]
    fn decodes_error_payload() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn commands_are_recognized() {
        assert_eq!(parse_command("/start"), Command::Start);
        assert_eq!(parse_command("/start@GemConciergeBot"), Command::Start);
        assert_eq!(parse_command(" /refresh "), Command::Refresh);
        assert_eq!(
            parse_command("  red stone from Burma "),
            Command::Query("red stone from Burma")
        );
        assert_eq!(parse_command("/unknown thing"), Command::Query("/unknown thing"));
    }

    #[test]
    fn delivery_plan_follows_image_and_caption_limit() {
        let text_only = Reply::text("hello");
        assert_eq!(plan_delivery(&text_only), vec![Outgoing::Text("hello")]);

        let with_photo = Reply {
            text: "Pink Spinel".to_string(),
            image_url: Some("https://example.com/s.jpg".to_string()),
        };
        assert_eq!(
            plan_delivery(&with_photo),
            vec![Outgoing::Photo {
                url: "https://example.com/s.jpg",
                caption: Some("Pink Spinel"),
            }]
        );

        let long = Reply {
            text: "x".repeat(MAX_CAPTION_CHARS + 1),
            image_url: Some("https://example.com/s.jpg".to_string()),
        };
        let plan = plan_delivery(&long);
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan[0],
            Outgoing::Photo {
                url: "https://example.com/s.jpg",
                caption: None
            }
        );
    }

    #[test]
    fn bot_url_does_not_double_slash() {
        let bot = TelegramBot::new("https://api.telegram.org/", "123:abc", 30).unwrap();
        assert_eq!(bot.base_url, "https://api.telegram.org/bot123:abc");
    }

    #[test]
    fn huge_poll_timeout_does_not_overflow() {
        let bot = TelegramBot::new("https://api.telegram.org", "123:abc", u64::MAX).unwrap();
        assert_eq!(bot.poll_timeout_secs, u64::MAX);
    }
}
