//! Remote Assets
//! Post-build stage that downloads remote images referenced by generated
//! markup, stores resized local copies, and rewrites the markup to use them

mod asset_writer;
mod audit;
mod config;
mod error;
mod extractor;
mod fetcher;
mod normalizer;
mod orchestrator;
mod retry;
mod rewriter;
mod transformer;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::fetcher::HttpFetcher;
use crate::orchestrator::Localizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "remote_assets=debug,info".into()),
        ))
        .init();

    // Load config
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    tracing::info!(
        "Localizing remote images under {} into {}",
        config.root.display(),
        config.output_dir.display()
    );

    let fetcher = HttpFetcher::new(config.fetch_timeout)?;
    let localizer = Arc::new(Localizer::new(config, Arc::new(fetcher)));

    // Ctrl-C stops new fetches; files already in progress are still written back
    let watcher = localizer.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight assets");
            watcher.shutdown();
        }
    });

    let summary = localizer.run().await?;

    for (kind, count) in &summary.failures_by_kind {
        tracing::info!("  {} failures: {}", kind, count);
    }

    Ok(())
}
