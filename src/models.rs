use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Lenient text deserializer for model output: accepts strings or numbers,
/// maps blanks and literal "null"/"none" to `None`.
fn deserialize_lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => non_blank(&s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Flexible amount deserializer to handle numbers or formatted strings like "$1,500"
fn deserialize_lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite() && *f >= 0.0),
        Value::String(s) => parse_amount(&s),
        _ => None,
    }))
}

fn deserialize_lenient_purpose<'de, D>(deserializer: D) -> Result<Option<Purpose>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Purpose::from_label))
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a catalog or budget amount.
///
/// Strips whitespace, thousands separators and currency marks. Returns `None`
/// for anything that is not a finite, non-negative number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '_' | '$' | '€' | '£' | '₽'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Render an amount as the shortest exact decimal: 1200.0 -> "1200",
/// 12.345 -> "12.345".
pub fn format_amount(value: f64) -> String {
    format!("{value}")
}

/// One catalog entry as read from the sheet.
///
/// Numeric columns keep their raw cell text so an unparsable price can be told
/// apart from a missing one.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CatalogRow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CatalogRow {
    pub fn price_value(&self) -> Option<f64> {
        self.price.as_deref().and_then(parse_amount)
    }

    /// Image URL if the cell holds something usable.
    pub fn image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
            && [
                &self.color,
                &self.shape,
                &self.size,
                &self.origin,
                &self.clarity,
                &self.price,
                &self.image_url,
            ]
            .iter()
            .all(|field| field.is_none())
    }
}

/// What the user is after. Informational only, never filters.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Buy,
    Compare,
    Ask,
}

impl Purpose {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "buy" => Some(Self::Buy),
            "compare" => Some(Self::Compare),
            "ask" => Some(Self::Ask),
            _ => None,
        }
    }
}

/// Structured interpretation of a user query. `None` means "no constraint".
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(from = "IntentPayload")]
pub struct Intent {
    pub stone: Option<String>,
    pub color: Option<String>,
    pub budget_max: Option<f64>,
    #[serde(rename = "intent")]
    pub purpose: Option<Purpose>,
}

/// Wire shape of the model's intent object. Models sometimes name the purpose
/// field `purpose`, sometimes send both; `intent` wins.
#[derive(Deserialize)]
struct IntentPayload {
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    stone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_text")]
    color: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    budget_max: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient_purpose")]
    intent: Option<Purpose>,
    #[serde(default, deserialize_with = "deserialize_lenient_purpose")]
    purpose: Option<Purpose>,
}

impl From<IntentPayload> for Intent {
    fn from(payload: IntentPayload) -> Self {
        Self {
            stone: payload.stone,
            color: payload.color,
            budget_max: payload.budget_max,
            purpose: payload.intent.or(payload.purpose),
        }
    }
}

impl Intent {
    pub fn is_unconstrained(&self) -> bool {
        self.stone.is_none() && self.color.is_none() && self.budget_max.is_none()
    }
}

/// What goes back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub image_url: Option<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_url: None,
        }
    }
}

// Chat message format (OpenAI-compatible)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// Chat completion request format
#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

// Chat completion response format
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}
