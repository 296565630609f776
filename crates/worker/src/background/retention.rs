//! Periodic removal of old submitted reports.
//!
//! Spawns a loop that asks the [`ReportsContext`] to drop `success`
//! reports older than the retention period. Removal goes through the
//! context so each report's engine and staged photos go with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldsync_sync::ReportsContext;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention sweep loop until `cancel` is triggered.
///
/// The first sweep runs immediately.
pub async fn run(
    context: Arc<ReportsContext>,
    retention_days: i64,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_days,
        interval_secs = every.as_secs(),
        "Report retention job started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Report retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = context.sweep_expired(Utc::now(), retention_days).await;
                if removed == 0 {
                    tracing::debug!("Report retention: nothing to remove");
                }
            }
        }
    }
}
