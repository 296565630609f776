//! Local report store.
//!
//! [`ReportStore`] keeps every report in memory, in insertion order, and
//! writes each change through to a [`ReportPersistence`]. The in-memory
//! copy is the source of truth for the running session: if a durable
//! write fails the error is logged and the in-memory change stands, so
//! the user's workflow keeps moving.
//!
//! Writers hold the write lock across the persistence call, so durable
//! writes land in the same order as the in-memory ones.

use std::sync::Arc;

use chrono::Utc;
use fieldsync_core::error::CoreError;
use fieldsync_core::report::{NewReport, Report, ReportStatus, StatusUpdate};
use fieldsync_core::retention;
use fieldsync_core::types::{ReportId, Timestamp};
use indexmap::IndexMap;
use tokio::sync::{broadcast, RwLock};

use crate::error::DbError;
use crate::persistence::ReportPersistence;

/// Broadcast channel capacity for store change notifications.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A change applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Added(ReportId),
    StatusChanged { id: ReportId, status: ReportStatus },
    Removed(ReportId),
}

/// Durable, ordered collection of locally created reports.
pub struct ReportStore {
    reports: RwLock<IndexMap<ReportId, Report>>,
    persistence: Arc<dyn ReportPersistence>,
    changes: broadcast::Sender<StoreChange>,
}

impl ReportStore {
    /// Load every persisted report and open the store.
    ///
    /// Records that fail validation are skipped by the persistence layer;
    /// a failure to read storage at all is returned.
    pub async fn open(persistence: Arc<dyn ReportPersistence>) -> Result<Self, DbError> {
        let loaded = persistence.load_all().await?;
        tracing::info!(count = loaded.len(), "Report store loaded");

        let reports = loaded.into_iter().map(|r| (r.id, r)).collect();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            reports: RwLock::new(reports),
            persistence,
            changes,
        })
    }

    /// Subscribe to store changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Insert a new `pending` report.
    ///
    /// Fails with [`CoreError::Conflict`] if a report with the same id
    /// already exists, leaving the existing one untouched.
    pub async fn add(&self, input: NewReport) -> Result<Report, CoreError> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&input.id) {
            return Err(CoreError::Conflict(format!(
                "Report {} already exists",
                input.id
            )));
        }

        let report = Report::new(input, Utc::now());
        reports.insert(report.id, report.clone());

        if let Err(e) = self.persistence.insert(&report).await {
            tracing::error!(report_id = %report.id, error = %e, "Failed to persist new report");
        }
        drop(reports);

        tracing::debug!(report_id = %report.id, "Report added");
        let _ = self.changes.send(StoreChange::Added(report.id));
        Ok(report)
    }

    /// Move a report to a new status, attaching the result or error the
    /// update carries.
    pub async fn update_status(
        &self,
        id: ReportId,
        update: StatusUpdate,
    ) -> Result<Report, CoreError> {
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or_else(|| CoreError::NotFound {
            entity: "report",
            id: id.to_string(),
        })?;

        report.apply(update)?;
        let updated = report.clone();

        if let Err(e) = self.persistence.update(&updated).await {
            tracing::error!(report_id = %id, error = %e, "Failed to persist report status");
        }
        drop(reports);

        tracing::debug!(report_id = %id, status = %updated.status(), "Report status updated");
        let _ = self.changes.send(StoreChange::StatusChanged {
            id,
            status: updated.status(),
        });
        Ok(updated)
    }

    pub async fn get(&self, id: ReportId) -> Option<Report> {
        self.reports.read().await.get(&id).cloned()
    }

    /// Every report, in insertion order.
    pub async fn list(&self) -> Vec<Report> {
        self.reports.read().await.values().cloned().collect()
    }

    /// Reports with `status`, in insertion order.
    pub async fn list_by_status(&self, status: ReportStatus) -> Vec<Report> {
        self.reports
            .read()
            .await
            .values()
            .filter(|r| r.status() == status)
            .cloned()
            .collect()
    }

    /// Number of reports still waiting for an outcome.
    pub async fn in_flight_count(&self) -> usize {
        self.reports
            .read()
            .await
            .values()
            .filter(|r| r.status().is_in_flight())
            .count()
    }

    /// Delete a report in any status. Returns the removed report.
    pub async fn remove(&self, id: ReportId) -> Option<Report> {
        let mut reports = self.reports.write().await;
        let removed = reports.shift_remove(&id)?;

        if let Err(e) = self.persistence.delete(id).await {
            tracing::error!(report_id = %id, error = %e, "Failed to delete persisted report");
        }
        drop(reports);

        tracing::debug!(report_id = %id, "Report removed");
        let _ = self.changes.send(StoreChange::Removed(id));
        Some(removed)
    }

    /// Ids of reports the retention sweep should remove.
    pub async fn expired(&self, now: Timestamp, retention_days: i64) -> Vec<ReportId> {
        self.reports
            .read()
            .await
            .values()
            .filter(|r| retention::is_expired(r, now, retention_days))
            .map(|r| r.id)
            .collect()
    }
}
