//! Tests for the worker's background jobs.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldsync_core::config::BackoffConfig;
use fieldsync_core::infrastructure::{ChangeType, GeoLocation, Infrastructure, InfrastructureChange};
use fieldsync_core::report::{NewReport, Report, ReportKind, ReportStatus, SubmissionResult};
use fieldsync_core::types::ReportId;
use fieldsync_db::persistence::SqliteReportPersistence;
use fieldsync_db::store::ReportStore;
use fieldsync_db::DbPool;
use fieldsync_sync::api::{ReportApi, SubmitOutcome};
use fieldsync_sync::engine::{Collaborators, EngineSettings};
use fieldsync_sync::infrastructure::{InfrastructureApi, InfrastructureSync};
use fieldsync_sync::photo::{PhotoStaging, PhotoUploader};
use fieldsync_sync::prober::{NetworkProbe, NetworkStatus};
use fieldsync_sync::{ReportsContext, TransportError};
use fieldsync_worker::background;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct AlwaysOnline;

#[async_trait]
impl NetworkProbe for AlwaysOnline {
    async fn check_network_status(&self) -> NetworkStatus {
        NetworkStatus::Available
    }
}

struct AcceptingApi;

#[async_trait]
impl ReportApi for AcceptingApi {
    async fn submit(&self, _report: &Report) -> Result<SubmitOutcome, TransportError> {
        Ok(SubmitOutcome::Accepted {
            result: SubmissionResult::default(),
            in_african_swine_fever_zone: None,
        })
    }
}

struct NoopUploader;

#[async_trait]
impl PhotoUploader for NoopUploader {
    async fn upload(
        &self,
        _report_id: ReportId,
        _path: &Path,
        _progress: mpsc::UnboundedSender<f32>,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Counts pushes and serves an empty record list.
#[derive(Default)]
struct CountingInfrastructureApi {
    fetches: AtomicUsize,
    pushes: AtomicUsize,
}

#[async_trait]
impl InfrastructureApi for CountingInfrastructureApi {
    async fn fetch_all(&self) -> Result<Vec<Infrastructure>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn push_change(&self, _change: &InfrastructureChange) -> Result<(), TransportError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn test_pool() -> DbPool {
    let pool = fieldsync_db::create_pool("sqlite::memory:").await.unwrap();
    fieldsync_db::run_migrations(&pool).await.unwrap();
    pool
}

async fn start_context(pool: &DbPool, photo_dir: &Path) -> Arc<ReportsContext> {
    let persistence = Arc::new(SqliteReportPersistence::new(pool.clone()));
    let store = Arc::new(ReportStore::open(persistence).await.unwrap());
    let collaborators = Collaborators {
        probe: Arc::new(AlwaysOnline),
        api: Arc::new(AcceptingApi),
        uploader: Arc::new(NoopUploader),
        staging: PhotoStaging::new(photo_dir),
    };
    let settings = EngineSettings {
        submit_timeout: Duration::from_secs(2),
        photo_upload_timeout: Duration::from_secs(2),
        network_retry: BackoffConfig::default(),
    };
    ReportsContext::start(store, collaborators, settings).await
}

/// Poll `check` until it holds, failing after five seconds.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn retention_job_removes_submitted_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let pool = test_pool().await;
    let context = start_context(&pool, tmp.path()).await;

    let report = context
        .add(NewReport::new(
            ReportKind::Harvest,
            vec![serde_json::json!({"id": "harvest-1"})],
        ))
        .await
        .unwrap();
    let id = report.id;
    eventually(|| {
        let context = Arc::clone(&context);
        async move { context.get(id).await.map(|r| r.status()) == Some(ReportStatus::Success) }
    })
    .await;

    let cancel = CancellationToken::new();
    let job = tokio::spawn(background::retention::run(
        Arc::clone(&context),
        0,
        Duration::from_millis(20),
        cancel.clone(),
    ));

    eventually(|| {
        let context = Arc::clone(&context);
        async move { context.get(id).await.is_none() }
    })
    .await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), job)
        .await
        .expect("retention job did not stop")
        .unwrap();
    context.dispose().await;
}

#[tokio::test]
async fn infrastructure_job_pushes_then_refreshes() {
    let pool = test_pool().await;
    let api = Arc::new(CountingInfrastructureApi::default());
    let sync = Arc::new(InfrastructureSync::new(pool, api.clone()));

    sync.record_change(
        ChangeType::Create,
        Infrastructure {
            guid: "g-tower".into(),
            id: fieldsync_core::infrastructure::LOCAL_SENTINEL_ID,
            infrastructure_type: "tower".into(),
            location: GeoLocation {
                latitude: 60.2,
                longitude: 24.9,
            },
            notes: None,
            created_on_device: None,
            changed_on_device: None,
        },
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let job = tokio::spawn(background::infrastructure_sync::run(
        Arc::clone(&sync),
        Duration::from_secs(3600),
        cancel.clone(),
    ));

    eventually(|| {
        let api = Arc::clone(&api);
        async move { api.fetches.load(Ordering::SeqCst) >= 1 }
    })
    .await;
    assert_eq!(api.pushes.load(Ordering::SeqCst), 1);
    assert_eq!(sync.push_pending().await.unwrap().pushed, 0);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), job)
        .await
        .expect("sync job did not stop")
        .unwrap();
}

#[tokio::test]
async fn event_log_stops_on_cancel() {
    let tmp = tempfile::tempdir().unwrap();
    let pool = test_pool().await;
    let context = start_context(&pool, tmp.path()).await;

    let cancel = CancellationToken::new();
    let job = tokio::spawn(background::event_log::run(context.subscribe(), cancel.clone()));

    context
        .add(NewReport::new(ReportKind::Observation, vec![]))
        .await
        .unwrap();
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), job)
        .await
        .expect("event log did not stop")
        .unwrap();
    context.dispose().await;
}
