//! Logs submission events as they happen.

use fieldsync_sync::SyncEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Log every event from `events` until `cancel` fires or the channel
/// closes.
pub async fn run(mut events: broadcast::Receiver<SyncEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SyncEvent::ReportAdded { report_id }) => {
                tracing::debug!(report_id = %report_id, "Report added");
            }
            Ok(SyncEvent::StateChanged { report_id, state }) => {
                tracing::debug!(report_id = %report_id, state = state.name(), "Report state");
            }
            Ok(SyncEvent::ReportRemoved { report_id }) => {
                tracing::debug!(report_id = %report_id, "Report removed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
