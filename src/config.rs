use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConciergeError, Result};
use crate::ranker::{DEFAULT_RESULT_CAP, MAX_RESULT_CAP};
use crate::sources::DEFAULT_SHEETS_API_BASE;
use crate::transport::DEFAULT_API_URL;

/// Main configuration structure for the concierge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: RunMode,
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Telegram,
    /// Read queries from stdin, print replies to stdout
    Stdin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    pub api_url: String,
    pub intent_model: String,
    pub reply_model: String,
    /// Deadline for each completion call, 1..=9 seconds
    pub timeout_secs: u64,
    pub intent_max_tokens: u32,
    pub reply_max_tokens: u32,
    pub intent_temperature: f32,
    pub reply_temperature: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSourceKind {
    #[default]
    Sheets,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub source: CatalogSourceKind,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub sheets_api_key: String,
    /// Service account key file contents, for private sheets
    #[serde(default)]
    pub service_account_json: String,
    pub sheets_api_base: String,
    /// A1 range or sheet name
    pub range: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub result_cap: usize,
}

/// Parameters for one kind of completion call.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from file with environment variable overrides.
    /// Never fails; call `validate` before using it.
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("Loaded .env from: {}", path.display()),
            Err(_) => tracing::debug!("No .env file found - continuing with env vars only"),
        }

        let config_path =
            env::var("GEM_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Apply overrides from a key lookup (the process environment in production)
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(raw: Option<String>, target: &mut T) {
            if let Some(value) = raw.and_then(|v| v.trim().parse().ok()) {
                *target = value;
            }
        }

        if let Some(mode) = var("CONCIERGE_MODE") {
            match mode.trim().to_lowercase().as_str() {
                "stdin" => self.mode = RunMode::Stdin,
                "telegram" => self.mode = RunMode::Telegram,
                other => tracing::warn!("Unknown CONCIERGE_MODE '{}', keeping {:?}", other, self.mode),
            }
        }

        // Telegram overrides
        if let Some(token) = var("TELEGRAM_TOKEN") {
            self.telegram.token = token;
        }

        // Completion API overrides
        if let Some(key) = var("GROQ_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.llm.api_key = key;
        }
        if let Some(url) = var("LLM_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(model) = var("LLM_INTENT_MODEL") {
            self.llm.intent_model = model;
        }
        if let Some(model) = var("LLM_REPLY_MODEL") {
            self.llm.reply_model = model;
        }
        parsed(var("LLM_TIMEOUT_SECS"), &mut self.llm.timeout_secs);

        // Catalog overrides
        if let Some(source) = var("CATALOG_SOURCE") {
            match source.trim().to_lowercase().as_str() {
                "sheets" => self.catalog.source = CatalogSourceKind::Sheets,
                "file" => self.catalog.source = CatalogSourceKind::File,
                other => tracing::warn!("Unknown CATALOG_SOURCE '{}'", other),
            }
        }
        if let Some(id) = var("SPREADSHEET_ID") {
            self.catalog.spreadsheet_id = id;
        }
        if let Some(key) = var("GOOGLE_SHEETS_API_KEY") {
            self.catalog.sheets_api_key = key;
        }
        if let Some(json) = var("GOOGLE_SERVICE_ACCOUNT_JSON") {
            self.catalog.service_account_json = json;
        }
        if let Some(range) = var("CATALOG_RANGE") {
            self.catalog.range = range;
        }
        if let Some(path) = var("CATALOG_FILE") {
            self.catalog.file_path = Some(path);
        }
        parsed(
            var("CATALOG_REFRESH_SECS"),
            &mut self.catalog.refresh_interval_secs,
        );

        parsed(var("RESULT_CAP"), &mut self.pipeline.result_cap);
    }

    /// Check required credentials and bounds. Errors here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.mode == RunMode::Telegram && self.telegram.token.trim().is_empty() {
            return Err(ConciergeError::Config("TELEGRAM_TOKEN is not set".into()));
        }

        match self.catalog.source {
            CatalogSourceKind::Sheets => {
                if self.catalog.spreadsheet_id.trim().is_empty() {
                    return Err(ConciergeError::Config("SPREADSHEET_ID is not set".into()));
                }
                if self.catalog.sheets_api_key.trim().is_empty()
                    && self.catalog.service_account_json.trim().is_empty()
                {
                    return Err(ConciergeError::Config(
                        "GOOGLE_SERVICE_ACCOUNT_JSON or GOOGLE_SHEETS_API_KEY must be set".into(),
                    ));
                }
            }
            CatalogSourceKind::File => {
                if self.catalog.file_path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(ConciergeError::Config(
                        "CATALOG_FILE must be set for the file catalog source".into(),
                    ));
                }
            }
        }

        if !(1..=9).contains(&self.llm.timeout_secs) {
            return Err(ConciergeError::Config(format!(
                "llm.timeout_secs must be between 1 and 9, got {}",
                self.llm.timeout_secs
            )));
        }
        if !(1..=MAX_RESULT_CAP).contains(&self.pipeline.result_cap) {
            return Err(ConciergeError::Config(format!(
                "pipeline.result_cap must be between 1 and {MAX_RESULT_CAP}, got {}",
                self.pipeline.result_cap
            )));
        }
        if self.catalog.refresh_interval_secs == 0 {
            return Err(ConciergeError::Config(
                "catalog.refresh_interval_secs cannot be 0".into(),
            ));
        }

        if !self.has_llm_key() {
            tracing::warn!(
                "No completion API key set - replies will use the templated listing"
            );
        }

        Ok(())
    }

    pub fn has_llm_key(&self) -> bool {
        !self.llm.api_key.trim().is_empty()
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn intent_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.llm.intent_model.clone(),
            max_tokens: self.llm.intent_max_tokens,
            temperature: self.llm.intent_temperature,
            timeout: self.llm_timeout(),
        }
    }

    pub fn reply_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.llm.reply_model.clone(),
            max_tokens: self.llm.reply_max_tokens,
            temperature: self.llm.reply_temperature,
            timeout: self.llm_timeout(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.catalog.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.fetch_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RunMode::Telegram,
            telegram: TelegramConfig {
                token: String::new(),
                api_base: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: String::new(),
                api_url: DEFAULT_API_URL.to_string(),
                intent_model: "llama-3.1-8b-instant".to_string(),
                reply_model: "llama-3.3-70b-versatile".to_string(),
                timeout_secs: 8,
                intent_max_tokens: 200,
                reply_max_tokens: 400,
                intent_temperature: 0.0,
                reply_temperature: 0.4,
            },
            catalog: CatalogConfig {
                source: CatalogSourceKind::Sheets,
                spreadsheet_id: String::new(),
                sheets_api_key: String::new(),
                service_account_json: String::new(),
                sheets_api_base: DEFAULT_SHEETS_API_BASE.to_string(),
                range: "Sheet1".to_string(),
                file_path: None,
                refresh_interval_secs: 300,
                fetch_timeout_secs: 15,
            },
            pipeline: PipelineConfig {
                result_cap: DEFAULT_RESULT_CAP,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sheets_config() -> Config {
        let mut cfg = Config::default();
        cfg.telegram.token = "123:abc".to_string();
        cfg.catalog.spreadsheet_id = "sheet".to_string();
        cfg.catalog.sheets_api_key = "key".to_string();
        cfg
    }

    #[test]
    fn complete_config_validates() {
        assert!(sheets_config().validate().is_ok());
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let mut cfg = sheets_config();
        cfg.telegram.token.clear();
        assert!(matches!(cfg.validate(), Err(ConciergeError::Config(_))));

        let mut cfg = sheets_config();
        cfg.catalog.spreadsheet_id = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(ConciergeError::Config(_))));

        let mut cfg = sheets_config();
        cfg.catalog.source = CatalogSourceKind::File;
        assert!(matches!(cfg.validate(), Err(ConciergeError::Config(_))));
        cfg.catalog.file_path = Some("catalog.yaml".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sheets_accept_either_credential() {
        let mut cfg = sheets_config();
        cfg.catalog.sheets_api_key.clear();
        assert!(matches!(cfg.validate(), Err(ConciergeError::Config(_))));

        let vars = HashMap::from([(
            "GOOGLE_SERVICE_ACCOUNT_JSON",
            r#"{"type": "service_account"}"#,
        )]);
        cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stdin_mode_does_not_need_telegram_token() {
        let mut cfg = sheets_config();
        cfg.telegram.token.clear();
        cfg.mode = RunMode::Stdin;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn timeout_must_be_single_digit_seconds() {
        let mut cfg = sheets_config();
        cfg.llm.timeout_secs = 0;
        assert!(cfg.validate().is_err());
        cfg.llm.timeout_secs = 30;
        assert!(cfg.validate().is_err());
        cfg.llm.timeout_secs = 9;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn result_cap_is_bounded() {
        let mut cfg = sheets_config();
        cfg.pipeline.result_cap = 0;
        assert!(cfg.validate().is_err());
        cfg.pipeline.result_cap = 200;
        assert!(matches!(cfg.validate(), Err(ConciergeError::Config(_))));
        cfg.pipeline.result_cap = MAX_RESULT_CAP;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CONCIERGE_MODE", "stdin"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CATALOG_SOURCE", "file"),
            ("CATALOG_FILE", "stones.yaml"),
            ("RESULT_CAP", "2"),
            ("LLM_TIMEOUT_SECS", "not-a-number"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.mode, RunMode::Stdin);
        assert_eq!(cfg.llm.api_key, "sk-test");
        assert_eq!(cfg.catalog.source, CatalogSourceKind::File);
        assert_eq!(cfg.catalog.file_path.as_deref(), Some("stones.yaml"));
        assert_eq!(cfg.pipeline.result_cap, 2);
        assert_eq!(cfg.llm.timeout_secs, 8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn yaml_config_round_trips_through_serde() {
        let yaml = r#"
mode: stdin
telegram:
  api_base: https://api.telegram.org
  poll_timeout_secs: 25
llm:
  api_url: https://api.groq.com/openai/v1/chat/completions
  intent_model: small
  reply_model: large
  timeout_secs: 5
  intent_max_tokens: 150
  reply_max_tokens: 300
  intent_temperature: 0.0
  reply_temperature: 0.3
catalog:
  source: file
  sheets_api_base: https://sheets.googleapis.com
  range: Sheet1
  file_path: catalog.yaml
  refresh_interval_secs: 60
  fetch_timeout_secs: 10
pipeline:
  result_cap: 3
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.mode, RunMode::Stdin);
        assert_eq!(cfg.intent_settings().model, "small");
        assert_eq!(cfg.reply_settings().timeout, Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
    }
}
