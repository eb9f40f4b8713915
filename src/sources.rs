use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{CatalogSource, RawRecord};
use crate::config::CatalogConfig;
use crate::error::{ConciergeError, Result};

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

const SHEETS_READONLY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets.readonly"];

/// How Sheets API requests are authorized.
pub enum SheetsAuth {
    /// API key, for sheets shared publicly.
    ApiKey(String),
    /// OAuth bearer tokens from a service account the sheet is shared with.
    ServiceAccount(Arc<dyn TokenProvider>),
}

impl SheetsAuth {
    /// Service account credentials win when both are configured.
    pub fn from_config(catalog: &CatalogConfig) -> Result<Self> {
        let account_json = catalog.service_account_json.trim();
        if !account_json.is_empty() {
            let account = CustomServiceAccount::from_json(account_json).map_err(|e| {
                ConciergeError::Config(format!("Invalid GOOGLE_SERVICE_ACCOUNT_JSON: {e}"))
            })?;
            return Ok(Self::ServiceAccount(Arc::new(account)));
        }

        let api_key = catalog.sheets_api_key.trim();
        if !api_key.is_empty() {
            return Ok(Self::ApiKey(api_key.to_string()));
        }

        Err(ConciergeError::Config(
            "GOOGLE_SERVICE_ACCOUNT_JSON or GOOGLE_SHEETS_API_KEY must be set".into(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Reads the catalog through the Google Sheets values API (read-only).
pub struct SheetsCatalogSource {
    client: Client,
    api_base: String,
    spreadsheet_id: String,
    range: String,
    auth: SheetsAuth,
}

impl SheetsCatalogSource {
    pub fn new(
        api_base: String,
        spreadsheet_id: String,
        range: String,
        auth: SheetsAuth,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base,
            spreadsheet_id,
            range,
            auth,
        })
    }

    fn values_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            ConciergeError::Config(format!("Invalid Sheets API base {}: {e}", self.api_base))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ConciergeError::Config(format!("Sheets API base cannot be a base: {}", self.api_base))
            })?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                self.range.as_str(),
            ]);
        Ok(url)
    }
}

#[async_trait]
impl CatalogSource for SheetsCatalogSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let url = self.values_url()?;
        tracing::debug!(spreadsheet = %self.spreadsheet_id, range = %self.range, "Fetching catalog sheet");

        let request = self.client.get(url).query(&[("majorDimension", "ROWS")]);
        let request = match &self.auth {
            SheetsAuth::ApiKey(key) => request.query(&[("key", key.as_str())]),
            SheetsAuth::ServiceAccount(provider) => {
                let token = provider.token(SHEETS_READONLY_SCOPES).await.map_err(|e| {
                    ConciergeError::Upstream(format!("Service account token request failed: {e}"))
                })?;
                request.bearer_auth(token.as_str())
            }
        };

        let response = request
            .send()
            .await
            // the query string may carry the API key
            .map_err(|e| {
                ConciergeError::Upstream(format!("Sheets request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConciergeError::Upstream(format!(
                "Sheets API returned {status}: {body}"
            )));
        }

        let range: ValueRange = response.json().await.map_err(|e| {
            ConciergeError::Upstream(format!("Sheets response unreadable: {}", e.without_url()))
        })?;
        Ok(records_from_values(range.values))
    }
}

/// Turn a header row plus data rows into keyed records. Short rows leave
/// their trailing columns absent.
pub fn records_from_values(values: Vec<Vec<Value>>) -> Vec<RawRecord> {
    let mut rows = values.into_iter();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| match cell {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .collect();

    rows.map(|cells| {
        headers
            .iter()
            .zip(cells)
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), cell))
            .collect()
    })
    .collect()
}

/// Reads the catalog from a local YAML or JSON list of records.
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConciergeError::Upstream(format!(
                "Failed to read catalog file {}: {e}",
                self.path.display()
            ))
        })?;
        // YAML is a superset of JSON, so one parser covers both
        Ok(serde_yaml::from_str(&contents)?)
    }
}
