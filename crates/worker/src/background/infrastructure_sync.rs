//! Periodic infrastructure sync: push local changes, then refresh the
//! server snapshot.

use std::sync::Arc;
use std::time::Duration;

use fieldsync_sync::infrastructure::InfrastructureSync;
use tokio_util::sync::CancellationToken;

/// How often local changes are pushed and the snapshot refreshed.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run the sync loop until `cancel` is triggered.
pub async fn run(sync: Arc<InfrastructureSync>, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = every.as_secs(),
        "Infrastructure sync job started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Infrastructure sync job stopping");
                break;
            }
            _ = interval.tick() => sync_once(&sync).await,
        }
    }
}

async fn sync_once(sync: &InfrastructureSync) {
    if let Err(e) = sync.push_pending().await {
        tracing::error!(error = %e, "Infrastructure sync: push failed");
    }
    match sync.refresh().await {
        Ok(records) => tracing::debug!(count = records.len(), "Infrastructure sync: refreshed"),
        Err(e) => tracing::warn!(error = %e, "Infrastructure sync: refresh failed"),
    }
}
