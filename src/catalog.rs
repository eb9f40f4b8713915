use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{ConciergeError, Result};
use crate::models::CatalogRow;

#[cfg(test)]
use mockall::automock;

/// One source row: column header -> cell value.
pub type RawRecord = serde_json::Map<String, Value>;

/// Read-only provider of catalog rows.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawRecord>>;
}

/// Immutable point-in-time copy of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    rows: Vec<CatalogRow>,
    loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn from_rows(rows: Vec<CatalogRow>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::from_rows(Vec::new())
    }

    pub fn from_records(records: &[RawRecord]) -> Self {
        let rows = records
            .iter()
            .map(row_from_record)
            .filter(|row| !row.is_blank())
            .collect();
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Color,
    Shape,
    Size,
    Origin,
    Clarity,
    Price,
    ImageUrl,
}

fn column_for(header: &str) -> Option<Column> {
    let header = header.trim().to_lowercase();
    let column = match header.as_str() {
        "name" | "stone" | "stone name" | "название камня" | "название" | "камень" => {
            Column::Name
        }
        "color" | "colour" | "цвет" => Column::Color,
        "shape" | "cut" | "форма" | "огранка" => Column::Shape,
        "size" | "carat" | "carats" | "weight" | "размер" | "вес" => Column::Size,
        "origin" | "происхождение" => Column::Origin,
        "clarity" | "чистота" => Column::Clarity,
        "price" | "cost" | "стоимость" | "цена" => Column::Price,
        "image_url" | "image" | "photo" | "image url" | "фото" => Column::ImageUrl,
        _ => return None,
    };
    Some(column)
}

fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Map a source record onto a row. Unknown columns are ignored, missing ones
/// are absent.
pub fn row_from_record(record: &RawRecord) -> CatalogRow {
    let mut row = CatalogRow::default();
    for (header, value) in record {
        let (Some(column), Some(text)) = (column_for(header), cell_text(value)) else {
            continue;
        };
        match column {
            Column::Name => row.name = text,
            Column::Color => row.color = Some(text),
            Column::Shape => row.shape = Some(text),
            Column::Size => row.size = Some(text),
            Column::Origin => row.origin = Some(text),
            Column::Clarity => row.clarity = Some(text),
            Column::Price => row.price = Some(text),
            Column::ImageUrl => row.image_url = Some(text),
        }
    }
    row
}

/// Holds the current snapshot and swaps it wholesale on refresh.
pub struct CatalogStore {
    source: Arc<dyn CatalogSource>,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl CatalogStore {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self::with_snapshot(source, CatalogSnapshot::empty())
    }

    pub fn with_snapshot(source: Arc<dyn CatalogSource>, snapshot: CatalogSnapshot) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot readers should use for one whole query.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Fetch and install a new snapshot, returning its row count.
    ///
    /// On failure the previous snapshot stays in place. An empty fetch never
    /// replaces a non-empty snapshot.
    pub async fn refresh(&self) -> Result<usize> {
        let records = self.source.fetch().await?;
        let next = CatalogSnapshot::from_records(&records);

        if next.is_empty() && !self.snapshot().await.is_empty() {
            return Err(ConciergeError::Upstream(
                "catalog source returned no rows, keeping previous snapshot".to_string(),
            ));
        }

        let count = next.len();
        let loaded_at = next.loaded_at();
        *self.current.write().await = Arc::new(next);
        tracing::info!(rows = count, %loaded_at, "Catalog snapshot refreshed");
        Ok(count)
    }

    /// Refresh on a fixed cadence in the background. Failures are logged and
    /// the last good snapshot is kept.
    pub fn spawn_refresh_loop(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // the first tick completes immediately; startup already loaded once
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh().await {
                    tracing::warn!("Catalog refresh skipped: {e}");
                }
            }
        })
    }
}
