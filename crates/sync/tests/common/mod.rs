#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fieldsync_core::config::BackoffConfig;
use fieldsync_core::report::{NewReport, Report, ReportKind, SubmissionResult};
use fieldsync_core::types::ReportId;
use fieldsync_db::persistence::SqliteReportPersistence;
use fieldsync_db::store::ReportStore;
use fieldsync_db::DbPool;
use fieldsync_sync::api::{ReportApi, SubmitOutcome};
use fieldsync_sync::engine::{Collaborators, EngineSettings};
use fieldsync_sync::machine::SubmissionState;
use fieldsync_sync::photo::{PhotoStaging, PhotoUploader};
use fieldsync_sync::prober::{NetworkProbe, NetworkStatus};
use fieldsync_sync::{SyncEvent, TransportError};
use tokio::sync::{broadcast, mpsc, watch, Notify};

/// Upper bound for anything a test waits on.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub async fn test_pool() -> DbPool {
    let pool = fieldsync_db::create_pool("sqlite::memory:").await.unwrap();
    fieldsync_db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn open_store(pool: &DbPool) -> Arc<ReportStore> {
    let persistence = Arc::new(SqliteReportPersistence::new(pool.clone()));
    Arc::new(ReportStore::open(persistence).await.unwrap())
}

pub fn observation(title: &str) -> NewReport {
    NewReport::new(
        ReportKind::Observation,
        vec![serde_json::json!({"id": title, "species": 47629, "amount": 1})],
    )
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Answers from a script, then a fixed fallback.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<NetworkStatus>>,
    fallback: NetworkStatus,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn online() -> Arc<Self> {
        Self::scripted(vec![], NetworkStatus::Available)
    }

    pub fn offline() -> Arc<Self> {
        Self::scripted(vec![], NetworkStatus::Unavailable)
    }

    pub fn scripted(script: Vec<NetworkStatus>, fallback: NetworkStatus) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkProbe for ScriptedProbe {
    async fn check_network_status(&self) -> NetworkStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

// ---------------------------------------------------------------------------
// Report API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ApiBehavior {
    /// Accept and assign this strap number.
    Accept(&'static str),
    /// Reject with this error code.
    Reject(&'static str),
    /// Fail at the transport level.
    Unreachable,
    /// Never answer.
    Hang,
}

pub struct FakeReportApi {
    behavior: Mutex<ApiBehavior>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeReportApi {
    pub fn new(behavior: ApiBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Every call blocks until `gate` is notified.
    pub fn gated(behavior: ApiBehavior, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, behavior: ApiBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportApi for FakeReportApi {
    async fn submit(&self, _report: &Report) -> Result<SubmitOutcome, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ApiBehavior::Accept(strap) => Ok(SubmitOutcome::Accepted {
                result: SubmissionResult {
                    strap_number: Some(strap.to_string()),
                    ..Default::default()
                },
                in_african_swine_fever_zone: Some(false),
            }),
            ApiBehavior::Reject(code) => Ok(SubmitOutcome::Rejected {
                code: code.to_string(),
                description: None,
                params: BTreeMap::new(),
            }),
            ApiBehavior::Unreachable => Err(TransportError::HttpStatus(503)),
            ApiBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(TransportError::HttpStatus(504))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Photo upload
// ---------------------------------------------------------------------------

/// Reports half and full progress, then succeeds unless told to fail.
#[derive(Default)]
pub struct FakeUploader {
    fail: AtomicBool,
    uploaded: Mutex<Vec<PathBuf>>,
}

impl FakeUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let uploader = Self::default();
        uploader.fail.store(true, Ordering::SeqCst);
        Arc::new(uploader)
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoUploader for FakeUploader {
    async fn upload(
        &self,
        _report_id: ReportId,
        path: &Path,
        progress: mpsc::UnboundedSender<f32>,
    ) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::HttpStatus(500));
        }
        let _ = progress.send(0.5);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = progress.send(1.0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.uploaded.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn collaborators(
    probe: Arc<ScriptedProbe>,
    api: Arc<FakeReportApi>,
    uploader: Arc<FakeUploader>,
    photo_dir: &Path,
) -> Collaborators {
    Collaborators {
        probe,
        api,
        uploader,
        staging: PhotoStaging::new(photo_dir),
    }
}

/// Short timings so waiting-for-network loops finish quickly.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        submit_timeout: Duration::from_secs(2),
        photo_upload_timeout: Duration::from_secs(2),
        network_retry: BackoffConfig {
            initial_delay_ms: 10,
            max_delay_ms: 40,
            multiplier: 2.0,
        },
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Collect a report's states from the event stream until it reaches
/// `success` or `failure`.
pub async fn states_until_settled(
    events: &mut broadcast::Receiver<SyncEvent>,
    id: ReportId,
) -> Vec<SubmissionState> {
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        let mut states = Vec::new();
        loop {
            match events.recv().await {
                Ok(SyncEvent::StateChanged { report_id, state }) if report_id == id => {
                    let settled = matches!(
                        state,
                        SubmissionState::Success { .. } | SubmissionState::Failure { .. }
                    );
                    states.push(state);
                    if settled {
                        return states;
                    }
                }
                Ok(_) => {}
                Err(e) => panic!("event stream broken: {e}"),
            }
        }
    })
    .await
    .expect("submission did not settle in time")
}

/// Wait for the `ReportRemoved` event of `id`.
pub async fn wait_for_removal(events: &mut broadcast::Receiver<SyncEvent>, id: ReportId) {
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(SyncEvent::ReportRemoved { report_id }) if report_id == id => return,
                Ok(_) => {}
                Err(e) => panic!("event stream broken: {e}"),
            }
        }
    })
    .await
    .expect("report was not removed in time")
}

/// Wait until the watched state satisfies `pred`.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<SubmissionState>,
    pred: impl FnMut(&SubmissionState) -> bool,
) -> SubmissionState {
    tokio::time::timeout(SETTLE_TIMEOUT, rx.wait_for(pred))
        .await
        .expect("state not reached in time")
        .expect("engine stopped")
        .clone()
}

/// State names with consecutive repeats (photo progress) collapsed.
pub fn names(states: &[SubmissionState]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = states.iter().map(SubmissionState::name).collect();
    names.dedup();
    names
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
