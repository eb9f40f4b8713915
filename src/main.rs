use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use gem_concierge::ConciergeService;
use gem_concierge::catalog::{CatalogSource, CatalogStore};
use gem_concierge::config::{CatalogSourceKind, Config, RunMode};
use gem_concierge::prompts;
use gem_concierge::sources::{FileCatalogSource, SheetsAuth, SheetsCatalogSource};
use gem_concierge::telegram::TelegramBot;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for replies in stdin mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    config.validate().context("invalid configuration")?;

    let source = build_source(&config)?;
    let catalog = Arc::new(CatalogStore::new(source));
    if let Err(e) = catalog.refresh().await {
        tracing::warn!("Initial catalog load failed, starting with an empty catalog: {e}");
    }
    let refresher = Arc::clone(&catalog).spawn_refresh_loop(config.refresh_interval());

    let service = Arc::new(ConciergeService::new(&config, Arc::clone(&catalog))?);

    let outcome = tokio::select! {
        result = serve(&config, Arc::clone(&service)) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            Ok(())
        }
    };

    refresher.abort();
    outcome
}

fn build_source(config: &Config) -> Result<Arc<dyn CatalogSource>> {
    let source: Arc<dyn CatalogSource> = match config.catalog.source {
        CatalogSourceKind::Sheets => Arc::new(SheetsCatalogSource::new(
            config.catalog.sheets_api_base.clone(),
            config.catalog.spreadsheet_id.clone(),
            config.catalog.range.clone(),
            SheetsAuth::from_config(&config.catalog)?,
            config.fetch_timeout(),
        )?),
        CatalogSourceKind::File => {
            let path = config
                .catalog
                .file_path
                .clone()
                .context("catalog.file_path is not set")?;
            Arc::new(FileCatalogSource::new(path))
        }
    };
    Ok(source)
}

async fn serve(config: &Config, service: Arc<ConciergeService>) -> Result<()> {
    match config.mode {
        RunMode::Telegram => {
            let bot = Arc::new(TelegramBot::new(
                &config.telegram.api_base,
                &config.telegram.token,
                config.telegram.poll_timeout_secs,
            )?);
            bot.run(service).await?;
            Ok(())
        }
        RunMode::Stdin => {
            tracing::info!("Reading queries from stdin (':refresh' reloads the catalog)");
            println!("{}", prompts::GREETING_MESSAGE);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim() == ":refresh" {
                    match service.catalog().refresh().await {
                        Ok(_) => println!("{}", prompts::REFRESH_OK_MESSAGE),
                        Err(e) => {
                            tracing::warn!("On-demand catalog refresh failed: {e}");
                            println!("{}", prompts::REFRESH_FAILED_MESSAGE);
                        }
                    }
                    continue;
                }
                let reply = service.handle(&line).await;
                println!("{}", reply.text);
                if let Some(url) = reply.image_url {
                    println!("[image] {url}");
                }
                println!();
            }
            Ok(())
        }
    }
}
