pub mod catalog;
pub mod config;
pub mod error;
pub mod intent;
pub mod models;
pub mod prompts;
pub mod ranker;
pub mod sources;
pub mod synth;
pub mod telegram;
pub mod transport;

use std::sync::Arc;
use tracing::Instrument;

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::error::Result;
use crate::intent::{GroqIntent, IntentParser};
use crate::models::Reply;
use crate::synth::{GroqSynth, Synthesizer};
use crate::transport::{GroqTransport, Transport, UnavailableTransport};

/// The query pipeline: intent parsing, candidate selection, reply synthesis.
///
/// Stateless apart from the shared catalog store, so one instance serves any
/// number of concurrent queries.
pub struct ConciergeService {
    catalog: Arc<CatalogStore>,
    parser: Arc<dyn IntentParser>,
    synth: Arc<dyn Synthesizer>,
    result_cap: usize,
}

impl ConciergeService {
    pub fn new(cfg: &Config, catalog: Arc<CatalogStore>) -> Result<Self> {
        let transport: Arc<dyn Transport> = if cfg.has_llm_key() {
            Arc::new(GroqTransport::new(
                cfg.llm.api_url.clone(),
                cfg.llm.api_key.clone(),
                cfg.llm_timeout(),
            )?)
        } else {
            Arc::new(UnavailableTransport)
        };

        let parser = GroqIntent::new(Arc::clone(&transport), cfg.intent_settings());
        let synth = GroqSynth::new(Arc::clone(&transport), cfg.reply_settings());

        Ok(Self::with_components(
            catalog,
            Arc::new(parser),
            Arc::new(synth),
            cfg.pipeline.result_cap,
        ))
    }

    pub fn with_components(
        catalog: Arc<CatalogStore>,
        parser: Arc<dyn IntentParser>,
        synth: Arc<dyn Synthesizer>,
        result_cap: usize,
    ) -> Self {
        Self {
            catalog,
            parser,
            synth,
            result_cap,
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    /// Answer one query. Never fails: parser and synthesizer failures degrade
    /// to the unfiltered intent and the templated listing respectively.
    pub async fn handle(&self, query: &str) -> Reply {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("query", %request_id);
        self.run_pipeline(query).instrument(span).await
    }

    async fn run_pipeline(&self, query: &str) -> Reply {
        let query = query.trim();
        if query.is_empty() {
            return Reply::text(prompts::GREETING_MESSAGE);
        }
        tracing::info!(chars = query.chars().count(), "Query received");

        let intent = self.parser.parse(query).await;
        tracing::debug!(?intent, unconstrained = intent.is_unconstrained(), "Intent parsed");

        let snapshot = self.catalog.snapshot().await;
        let results = ranker::select(&intent, &snapshot, self.result_cap);
        tracing::info!(
            candidates = results.len(),
            catalog_rows = snapshot.len(),
            "Candidates selected"
        );

        let text = self.synth.synthesize(&intent, &results).await;

        // a photo only makes sense for a single clear match
        let image_url = match results.as_slice() {
            [only] => only.image().map(str::to_string),
            _ => None,
        };

        tracing::info!(with_image = image_url.is_some(), "Reply produced");
        Reply { text, image_url }
    }
}
