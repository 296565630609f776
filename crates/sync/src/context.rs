//! Reports context.
//!
//! [`ReportsContext`] is the application-facing entry point for locally
//! created reports. It owns the [`ReportStore`], keeps at most one
//! [`SubmissionEngine`] per report, and forwards user commands to them.
//!
//! Engines are attached when a report is created, when an interrupted
//! report is resumed at startup, or lazily the first time a report is
//! retried or watched. An engine lives until its report is removed or the
//! context is disposed. Removing a report through the store directly is
//! noticed too: a watcher task tears the engine down and deletes the
//! report's photos.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use fieldsync_core::messages::ErrorMessages;
use fieldsync_core::report::{NewReport, Report};
use fieldsync_core::types::{ReportId, Timestamp};
use fieldsync_db::store::{ReportStore, StoreChange};
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::engine::{Collaborators, EngineCommand, EngineHandle, EngineSettings, SubmissionEngine};
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::machine::SubmissionState;

/// Broadcast channel capacity for sync events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct ReportsContext {
    store: Arc<ReportStore>,
    collaborators: Collaborators,
    settings: EngineSettings,
    messages: ErrorMessages,
    /// Running engines indexed by report id.
    engines: RwLock<HashMap<ReportId, EngineHandle>>,
    event_tx: broadcast::Sender<SyncEvent>,
    /// Master cancellation token, cancelled by [`ReportsContext::dispose`].
    cancel: CancellationToken,
}

impl ReportsContext {
    /// Create the context and resume every report left `pending` or
    /// `loading` by a previous run.
    pub async fn start(
        store: Arc<ReportStore>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Self::start_with_messages(store, collaborators, settings, ErrorMessages::default()).await
    }

    /// Like [`ReportsContext::start`] with a custom failure message table.
    pub async fn start_with_messages(
        store: Arc<ReportStore>,
        collaborators: Collaborators,
        settings: EngineSettings,
        messages: ErrorMessages,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let context = Arc::new(Self {
            store,
            collaborators,
            settings,
            messages,
            engines: RwLock::new(HashMap::new()),
            event_tx,
            cancel: CancellationToken::new(),
        });

        context.spawn_store_watcher();
        context.resume_in_flight().await;
        context
    }

    /// Subscribe to report and submission events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Create a report and start submitting it.
    pub async fn add(&self, input: NewReport) -> Result<Report, SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::ShuttingDown);
        }

        let report = self.store.add(input).await?;
        let _ = self.event_tx.send(SyncEvent::ReportAdded {
            report_id: report.id,
        });
        tracing::info!(report_id = %report.id, title = %report.title(), "Report created");

        self.attach(&report).await;
        self.send(report.id, EngineCommand::Submit).await;
        Ok(report)
    }

    /// Ask a failed report's engine to try again.
    ///
    /// Returns `false` if no such report exists. A retry that arrives
    /// while the engine is busy is accepted here and ignored by the
    /// engine.
    pub async fn retry(&self, id: ReportId) -> bool {
        if !self.ensure_engine(id).await {
            return false;
        }
        self.send(id, EngineCommand::Retry).await
    }

    /// Delete a report in any status, stopping its engine.
    pub async fn remove(&self, id: ReportId) -> Option<Report> {
        let removed = self.store.remove(id).await;
        self.detach(id).await;
        removed
    }

    pub async fn get(&self, id: ReportId) -> Option<Report> {
        self.store.get(id).await
    }

    /// Every report, in creation order.
    pub async fn reports(&self) -> Vec<Report> {
        self.store.list().await
    }

    /// Current submission state of a report.
    ///
    /// Reports without a running engine report the state their persisted
    /// status implies.
    pub async fn state(&self, id: ReportId) -> Option<SubmissionState> {
        if let Some(handle) = self.engines.read().await.get(&id) {
            return Some(handle.state());
        }
        self.store
            .get(id)
            .await
            .map(|report| SubmissionState::for_report(&report))
    }

    /// Follow a report's state changes.
    pub async fn watch(&self, id: ReportId) -> Option<watch::Receiver<SubmissionState>> {
        if !self.ensure_engine(id).await {
            return None;
        }
        self.engines.read().await.get(&id).map(EngineHandle::watch)
    }

    pub async fn is_waiting_for_network(&self, id: ReportId) -> bool {
        self.state(id)
            .await
            .is_some_and(|state| state.is_waiting_for_network())
    }

    /// Upload progress in `[0, 1]` while the report's photo is uploading.
    pub async fn photo_progress(&self, id: ReportId) -> Option<f32> {
        self.state(id).await.and_then(|state| state.photo_progress())
    }

    /// User-facing message for a failed report.
    pub async fn failure_message(&self, id: ReportId) -> Option<String> {
        let report = self.store.get(id).await?;
        report.error().map(|failure| self.messages.resolve(failure))
    }

    /// Number of reports still `pending` or `loading`.
    pub async fn pending_count(&self) -> usize {
        self.store.in_flight_count().await
    }

    /// Remove successful reports older than `retention_days`.
    ///
    /// Returns how many were removed.
    pub async fn sweep_expired(&self, now: Timestamp, retention_days: i64) -> usize {
        let expired = self.store.expired(now, retention_days).await;
        let mut removed = 0;
        for id in expired {
            if self.remove(id).await.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, retention_days, "Expired reports removed");
        }
        removed
    }

    /// Stop every engine and the store watcher.
    ///
    /// Cancels the master token, then waits up to 5 seconds per engine
    /// for a clean exit.
    pub async fn dispose(&self) {
        tracing::info!("Shutting down reports context");
        self.cancel.cancel();

        let engines: Vec<(ReportId, EngineHandle)> =
            self.engines.write().await.drain().collect();
        for (id, handle) in engines {
            tracing::debug!(report_id = %id, "Stopping submission engine");
            handle.shutdown().await;
        }

        tracing::info!("Reports context shut down complete");
    }

    // ---- private helpers ----

    async fn resume_in_flight(&self) {
        let reports = self.store.list().await;
        let total = reports.len();
        let mut resumed = 0;

        for report in reports.iter().filter(|r| r.status().is_in_flight()) {
            self.attach(report).await;
            if self.send(report.id, EngineCommand::Submit).await {
                resumed += 1;
            }
        }

        tracing::info!(total, resumed, "Reports context started");
    }

    /// Spawn an engine for `report` unless one is already running.
    async fn attach(&self, report: &Report) {
        let mut engines = self.engines.write().await;
        if engines.contains_key(&report.id) || self.cancel.is_cancelled() {
            return;
        }

        let handle = SubmissionEngine::spawn(
            report.clone(),
            Arc::clone(&self.store),
            self.collaborators.clone(),
            self.settings.clone(),
            self.event_tx.clone(),
            self.cancel.child_token(),
        );
        engines.insert(report.id, handle);
    }

    /// Make sure a report has an engine. Returns `false` if the report
    /// does not exist.
    async fn ensure_engine(&self, id: ReportId) -> bool {
        if self.engines.read().await.contains_key(&id) {
            return true;
        }
        match self.store.get(id).await {
            Some(report) => {
                self.attach(&report).await;
                self.engines.read().await.contains_key(&id)
            }
            None => false,
        }
    }

    async fn send(&self, id: ReportId, command: EngineCommand) -> bool {
        match self.engines.read().await.get(&id) {
            Some(handle) => handle.send(command),
            None => false,
        }
    }

    /// Stop and forget a report's engine. No-op if none is running.
    async fn detach(&self, id: ReportId) {
        let handle = self.engines.write().await.remove(&id);
        if let Some(handle) = handle {
            handle.shutdown().await;
            tracing::debug!(report_id = %id, "Submission engine detached");
        }
    }

    /// Clean up after a report left the store.
    async fn on_removed(&self, id: ReportId) {
        self.detach(id).await;
        if let Err(e) = self.collaborators.staging.discard(id).await {
            tracing::warn!(report_id = %id, error = %e, "Failed to delete report photos");
        }
        let _ = self.event_tx.send(SyncEvent::ReportRemoved { report_id: id });
    }

    /// Detach engines whose report is gone.
    async fn prune_orphans(&self) {
        let ids: Vec<ReportId> = self.engines.read().await.keys().copied().collect();
        for id in ids {
            if self.store.get(id).await.is_none() {
                self.on_removed(id).await;
            }
        }
    }

    /// Follow store changes so removals made outside the context still
    /// stop the report's engine.
    fn spawn_store_watcher(self: &Arc<Self>) {
        let mut changes = self.store.subscribe();
        let context: Weak<Self> = Arc::downgrade(self);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => change,
                };
                let Some(context) = context.upgrade() else {
                    break;
                };

                match change {
                    Ok(StoreChange::Removed(id)) => context.on_removed(id).await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Store change watcher lagged, resyncing");
                        context.prune_orphans().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Store change watcher stopped");
        });
    }
}
