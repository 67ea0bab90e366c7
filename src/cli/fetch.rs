use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::catalog::SpotifyClient;
use crate::repository::Store;
use crate::services::{build_engine, PipelineConfig, WorkerKind};
use crate::utils::config::Config;

/// Runs the fetch pipeline until the work drains or the context is
/// canceled. Clean cancellation is a normal exit.
pub async fn run(
    ctx: &CancellationToken,
    store: Arc<Store>,
    config: &Config,
    workers: Option<Vec<WorkerKind>>,
) -> anyhow::Result<()> {
    let catalog_config = config.catalog_config()?;
    let client = Arc::new(SpotifyClient::new(catalog_config)?);

    let engine = build_engine(
        store,
        client,
        PipelineConfig {
            workers: workers.unwrap_or_else(WorkerKind::all),
            seed_url: config.seed_url.clone(),
            indexer_batch: config.indexer_batch,
            with_reporter: true,
            reporter_path: config.reporter_log.clone(),
            reporter_interval: config.reporter_interval,
        },
    );

    engine.run(ctx).await?;
    Ok(())
}
