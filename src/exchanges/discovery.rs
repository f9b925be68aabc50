use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::catalog::MergeStats;
use super::traits::PriceSource;

/// Fetches the full listing and merges it into the catalog. The catalog is only
/// touched once the whole response has parsed.
pub async fn run_discovery_pass(source: &dyn PriceSource) -> Result<MergeStats> {
    let entries = source.fetch_catalog().await?;
    let stats = source.catalog().merge(entries).await;
    source.catalog().mark_ready().await;
    Ok(stats)
}

pub fn spawn_discovery(source: Arc<dyn PriceSource>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_discovery_pass(source.as_ref()).await {
                Ok(stats) => {
                    let total = source.catalog().len().await;
                    debug!(
                        exchange = %source.name(),
                        added = stats.added,
                        updated = stats.updated,
                        rejected = stats.rejected,
                        total,
                        "discovery pass complete"
                    )
                }
                Err(e) => error!(exchange = %source.name(), "discovery pass failed: {:#}", e),
            }
            tokio::time::sleep(source.discovery_interval()).await;
        }
    })
}
