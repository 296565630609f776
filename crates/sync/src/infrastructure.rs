//! Infrastructure sync.
//!
//! Local edits to infrastructure records go into an append-only change
//! log. [`InfrastructureSync`] pushes unsent changes to the server,
//! refreshes the server snapshot, and produces the reconciled list the
//! user sees via [`combine`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldsync_core::infrastructure::{ChangeStatus, ChangeType, Infrastructure, InfrastructureChange};
use fieldsync_core::reconcile::combine;
use fieldsync_db::repositories::{InfrastructureChangeRepo, InfrastructureSnapshotRepo};
use fieldsync_db::DbPool;

use crate::api::{ensure_success, parse_response, SubmitOutcome};
use crate::error::{SyncError, TransportError};

/// Port for the infrastructure endpoints.
#[async_trait]
pub trait InfrastructureApi: Send + Sync {
    /// Every record visible to the user.
    async fn fetch_all(&self) -> Result<Vec<Infrastructure>, TransportError>;

    /// Send one change. A rejection comes back as
    /// [`TransportError::Rejected`].
    async fn push_change(&self, change: &InfrastructureChange) -> Result<(), TransportError>;
}

/// HTTP implementation of [`InfrastructureApi`].
pub struct HttpInfrastructureApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInfrastructureApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InfrastructureApi for HttpInfrastructureApi {
    async fn fetch_all(&self) -> Result<Vec<Infrastructure>, TransportError> {
        let response = self
            .client
            .get(format!("{}/infrastructure", self.base_url))
            .send()
            .await?;
        let bytes = ensure_success(response)?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn push_change(&self, change: &InfrastructureChange) -> Result<(), TransportError> {
        let response = self
            .client
            .post(format!("{}/infrastructure/changes", self.base_url))
            .json(change)
            .send()
            .await?;

        match parse_response(response).await?.into_outcome() {
            SubmitOutcome::Accepted { .. } => Ok(()),
            SubmitOutcome::Rejected {
                code,
                description,
                params,
            } => Err(TransportError::Rejected {
                code,
                description,
                params,
            }),
        }
    }
}

/// Counts from one [`InfrastructureSync::push_pending`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub pushed: usize,
    pub rejected: usize,
    /// Changes left unsent because the server could not be reached.
    pub remaining: usize,
}

/// Deadline for a single infrastructure request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct InfrastructureSync {
    pool: DbPool,
    api: Arc<dyn InfrastructureApi>,
    request_timeout: Duration,
}

impl InfrastructureSync {
    pub fn new(pool: DbPool, api: Arc<dyn InfrastructureApi>) -> Self {
        Self {
            pool,
            api,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run one API call under the request deadline.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(
                self.request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Log a local edit as a `pending` change.
    pub async fn record_change(
        &self,
        change_type: ChangeType,
        mut infrastructure: Infrastructure,
    ) -> Result<InfrastructureChange, SyncError> {
        let now = Utc::now();
        match change_type {
            ChangeType::Create => {
                infrastructure.created_on_device.get_or_insert(now);
            }
            ChangeType::Update => infrastructure.changed_on_device = Some(now),
            ChangeType::Delete => {}
        }

        let change = InfrastructureChange::pending(change_type, infrastructure, now);
        InfrastructureChangeRepo::append(&self.pool, &change).await?;
        tracing::debug!(
            change_id = %change.id,
            guid = %change.infrastructure.guid,
            change_type = change_type.as_str(),
            "Infrastructure change recorded",
        );
        Ok(change)
    }

    /// Fetch from the server, store the snapshot, and return the
    /// reconciled list.
    pub async fn refresh(&self) -> Result<Vec<Infrastructure>, SyncError> {
        // Taken before the request: a change completing mid-fetch is
        // newer than the snapshot and stays applied.
        let fetched_at = Utc::now();
        let records = self.bounded(self.api.fetch_all()).await?;
        InfrastructureSnapshotRepo::save(&self.pool, fetched_at, &records).await?;
        tracing::info!(count = records.len(), "Infrastructure snapshot refreshed");

        let changes = InfrastructureChangeRepo::list(&self.pool).await?;
        Ok(combine(&records, fetched_at, &changes))
    }

    /// The reconciled list from the cached snapshot, without network.
    pub async fn reconciled(&self) -> Result<Vec<Infrastructure>, SyncError> {
        let (fetched_at, records) = match InfrastructureSnapshotRepo::load(&self.pool).await? {
            Some(snapshot) => (snapshot.fetched_at, snapshot.records),
            None => (DateTime::<Utc>::MIN_UTC, Vec::new()),
        };
        let changes = InfrastructureChangeRepo::list(&self.pool).await?;
        Ok(combine(&records, fetched_at, &changes))
    }

    /// Send unsent changes, oldest first.
    ///
    /// Each change is marked `active` while in flight and `success` or
    /// `failure` afterwards. Changes left `active` by an interrupted run
    /// are sent again. A transport failure or timeout stops the run so
    /// later changes never overtake earlier ones; a server rejection marks
    /// that change `failure` and moves on.
    pub async fn push_pending(&self) -> Result<PushSummary, SyncError> {
        let unsent: Vec<InfrastructureChange> = InfrastructureChangeRepo::list(&self.pool)
            .await?
            .into_iter()
            .filter(|c| c.status.needs_push())
            .collect();

        let mut summary = PushSummary::default();
        for (index, change) in unsent.iter().enumerate() {
            InfrastructureChangeRepo::mark_outcome(&self.pool, &change.id, ChangeStatus::Active, None)
                .await?;

            match self.bounded(self.api.push_change(change)).await {
                Ok(()) => {
                    InfrastructureChangeRepo::mark_outcome(
                        &self.pool,
                        &change.id,
                        ChangeStatus::Success,
                        Some(Utc::now()),
                    )
                    .await?;
                    summary.pushed += 1;
                }
                Err(e @ TransportError::Rejected { .. }) => {
                    tracing::warn!(change_id = %change.id, error = %e, "Infrastructure change rejected");
                    InfrastructureChangeRepo::mark_outcome(
                        &self.pool,
                        &change.id,
                        ChangeStatus::Failure,
                        Some(Utc::now()),
                    )
                    .await?;
                    summary.rejected += 1;
                }
                Err(e) => {
                    tracing::warn!(change_id = %change.id, error = %e, "Infrastructure push interrupted");
                    InfrastructureChangeRepo::mark_outcome(
                        &self.pool,
                        &change.id,
                        ChangeStatus::Failure,
                        Some(Utc::now()),
                    )
                    .await?;
                    summary.remaining = unsent.len() - index;
                    break;
                }
            }
        }

        tracing::info!(
            pushed = summary.pushed,
            rejected = summary.rejected,
            remaining = summary.remaining,
            "Infrastructure push finished",
        );
        Ok(summary)
    }
}
