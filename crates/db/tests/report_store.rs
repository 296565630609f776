//! Integration tests for the local report store against in-memory SQLite.
//!
//! Covers:
//! - create / duplicate create
//! - status transitions with result/error exclusivity
//! - insertion order and enumeration by status
//! - survival across a store reopen (process restart)
//! - forward-compatible decoding of stored records
//! - best-effort persistence when the durable write fails

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use fieldsync_core::error::CoreError;
use fieldsync_core::failure::SubmissionFailure;
use fieldsync_core::report::{NewReport, Report, ReportKind, ReportStatus, StatusUpdate, SubmissionResult};
use fieldsync_core::types::ReportId;
use fieldsync_db::persistence::{ReportPersistence, SqliteReportPersistence};
use fieldsync_db::repositories::ReportRepo;
use fieldsync_db::store::{ReportStore, StoreChange};
use fieldsync_db::{DbError, DbPool};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn test_pool() -> DbPool {
    let pool = fieldsync_db::create_pool("sqlite::memory:").await.unwrap();
    fieldsync_db::run_migrations(&pool).await.unwrap();
    pool
}

async fn open_store(pool: &DbPool) -> ReportStore {
    ReportStore::open(Arc::new(SqliteReportPersistence::new(pool.clone())))
        .await
        .unwrap()
}

fn observation(title: &str) -> NewReport {
    NewReport::new(
        ReportKind::Observation,
        vec![serde_json::json!({"id": title, "species": 47629})],
    )
}

fn strap(number: &str) -> StatusUpdate {
    StatusUpdate::Success {
        result: SubmissionResult {
            strap_number: Some(number.to_string()),
            ..Default::default()
        },
        in_african_swine_fever_zone: Some(false),
    }
}

/// Persistence whose writes always fail.
struct BrokenDisk;

#[async_trait]
impl ReportPersistence for BrokenDisk {
    async fn load_all(&self) -> Result<Vec<Report>, DbError> {
        Ok(Vec::new())
    }
    async fn insert(&self, _report: &Report) -> Result<(), DbError> {
        Err(CoreError::Internal("disk full".into()).into())
    }
    async fn update(&self, _report: &Report) -> Result<(), DbError> {
        Err(CoreError::Internal("disk full".into()).into())
    }
    async fn delete(&self, _id: ReportId) -> Result<(), DbError> {
        Err(CoreError::Internal("disk full".into()).into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_creates_pending_report() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;

    let report = store.add(observation("obs-1")).await.unwrap();

    assert_eq!(report.status(), ReportStatus::Pending);
    assert_eq!(store.get(report.id).await, Some(report.clone()));
    assert_eq!(
        ReportRepo::find_by_id(&pool, report.id).await.unwrap(),
        Some(report)
    );
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;

    let input = observation("obs-1");
    let first = store.add(input.clone()).await.unwrap();
    store
        .update_status(first.id, StatusUpdate::Loading)
        .await
        .unwrap();

    let err = store.add(input).await.unwrap_err();

    assert_matches!(err, CoreError::Conflict(_));
    assert_eq!(
        store.get(first.id).await.map(|r| r.status()),
        Some(ReportStatus::Loading)
    );
}

#[tokio::test]
async fn success_attaches_result_atomically() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;
    let report = store.add(observation("harvest")).await.unwrap();

    store
        .update_status(report.id, StatusUpdate::Loading)
        .await
        .unwrap();
    let done = store
        .update_status(report.id, strap("HR-2025-001"))
        .await
        .unwrap();

    assert_eq!(done.status(), ReportStatus::Success);
    assert!(done.error().is_none());

    let stored = ReportRepo::find_by_id(&pool, report.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), ReportStatus::Success);
    assert_eq!(
        stored.result().and_then(|r| r.strap_number.as_deref()),
        Some("HR-2025-001")
    );
}

#[tokio::test]
async fn illegal_transition_is_rejected() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;
    let report = store.add(observation("obs")).await.unwrap();
    store
        .update_status(report.id, StatusUpdate::Loading)
        .await
        .unwrap();
    store
        .update_status(report.id, strap("X"))
        .await
        .unwrap();

    let err = store
        .update_status(report.id, StatusUpdate::Pending)
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::InvalidTransition { .. });
    assert_eq!(
        store.get(report.id).await.map(|r| r.status()),
        Some(ReportStatus::Success)
    );
}

#[tokio::test]
async fn update_unknown_report_is_not_found() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;

    let err = store
        .update_status(uuid::Uuid::now_v7(), StatusUpdate::Loading)
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::NotFound { entity: "report", .. });
}

#[tokio::test]
async fn list_preserves_insertion_order_and_filters_by_status() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;

    let a = store.add(observation("a")).await.unwrap();
    let b = store.add(observation("b")).await.unwrap();
    let c = store.add(observation("c")).await.unwrap();
    store.update_status(b.id, StatusUpdate::Loading).await.unwrap();
    store
        .update_status(b.id, StatusUpdate::Failure(SubmissionFailure::Network))
        .await
        .unwrap();

    let ids: Vec<_> = store.list().await.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);

    let failed: Vec<_> = store
        .list_by_status(ReportStatus::Failure)
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(failed, vec![b.id]);
    assert_eq!(store.in_flight_count().await, 2);
}

#[tokio::test]
async fn reports_survive_reopen() {
    let pool = test_pool().await;
    let (pending_id, loading_id, failed_id) = {
        let store = open_store(&pool).await;
        let pending = store.add(observation("pending")).await.unwrap();
        let loading = store.add(observation("loading")).await.unwrap();
        let failed = store.add(observation("failed")).await.unwrap();
        store
            .update_status(loading.id, StatusUpdate::Loading)
            .await
            .unwrap();
        store
            .update_status(failed.id, StatusUpdate::Loading)
            .await
            .unwrap();
        store
            .update_status(
                failed.id,
                StatusUpdate::Failure(SubmissionFailure::timeout(30_000)),
            )
            .await
            .unwrap();
        (pending.id, loading.id, failed.id)
    };

    let reopened = open_store(&pool).await;
    let reports = reopened.list().await;

    assert_eq!(
        reports.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![pending_id, loading_id, failed_id]
    );
    assert_eq!(reports[1].status(), ReportStatus::Loading);
    assert_eq!(
        reports[2].error(),
        Some(&SubmissionFailure::timeout(30_000))
    );
}

#[tokio::test]
async fn remove_deletes_in_any_status() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;
    let report = store.add(observation("discard me")).await.unwrap();
    store
        .update_status(report.id, StatusUpdate::Loading)
        .await
        .unwrap();

    let removed = store.remove(report.id).await;

    assert_eq!(removed.map(|r| r.id), Some(report.id));
    assert!(store.get(report.id).await.is_none());
    assert!(ReportRepo::find_by_id(&pool, report.id)
        .await
        .unwrap()
        .is_none());
    assert!(store.remove(report.id).await.is_none());
}

#[tokio::test]
async fn store_changes_are_broadcast() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;
    let mut rx = store.subscribe();

    let report = store.add(observation("x")).await.unwrap();
    store
        .update_status(report.id, StatusUpdate::Loading)
        .await
        .unwrap();
    store.remove(report.id).await;

    assert_eq!(rx.recv().await.unwrap(), StoreChange::Added(report.id));
    assert_eq!(
        rx.recv().await.unwrap(),
        StoreChange::StatusChanged {
            id: report.id,
            status: ReportStatus::Loading
        }
    );
    assert_eq!(rx.recv().await.unwrap(), StoreChange::Removed(report.id));
}

#[tokio::test]
async fn unknown_stored_fields_are_ignored() {
    let pool = test_pool().await;
    let report = Report::new(observation("from the future"), Utc::now());
    let mut record = serde_json::to_value(&report).unwrap();
    record["attachments"] = serde_json::json!([{"kind": "audio"}]);

    sqlx::query(
        "INSERT INTO reports (id, status, created_at, record, updated_at) \
         VALUES (?1, 'pending', ?2, ?3, ?2)",
    )
    .bind(report.id.to_string())
    .bind(fieldsync_db::models::format_timestamp(report.created_at))
    .bind(record.to_string())
    .execute(&pool)
    .await
    .unwrap();

    let store = open_store(&pool).await;

    assert_eq!(store.get(report.id).await, Some(report));
}

#[tokio::test]
async fn corrupt_rows_are_skipped_on_load() {
    let pool = test_pool().await;
    let good = open_store(&pool).await.add(observation("good")).await.unwrap();

    sqlx::query(
        "INSERT INTO reports (id, status, created_at, record, updated_at) \
         VALUES ('broken', 'pending', '2025-01-01T00:00:00.000Z', '{not json', '2025-01-01T00:00:00.000Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let store = open_store(&pool).await;

    assert_eq!(
        store.list().await.into_iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![good.id]
    );
}

#[tokio::test]
async fn persistence_failure_keeps_in_memory_state() {
    let store = ReportStore::open(Arc::new(BrokenDisk)).await.unwrap();

    let report = store.add(observation("offline disk")).await.unwrap();
    let updated = store
        .update_status(report.id, StatusUpdate::Loading)
        .await
        .unwrap();

    assert_eq!(updated.status(), ReportStatus::Loading);
    assert_eq!(
        store.get(report.id).await.map(|r| r.status()),
        Some(ReportStatus::Loading)
    );
    assert!(store.remove(report.id).await.is_some());
}

#[tokio::test]
async fn expired_lists_only_old_successes() {
    let pool = test_pool().await;
    let store = open_store(&pool).await;
    let done = store.add(observation("done")).await.unwrap();
    let waiting = store.add(observation("waiting")).await.unwrap();
    store.update_status(done.id, StatusUpdate::Loading).await.unwrap();
    store.update_status(done.id, strap("S-1")).await.unwrap();

    let later = Utc::now() + Duration::days(31);

    assert_eq!(store.expired(later, 30).await, vec![done.id]);
    assert!(store.expired(Utc::now(), 30).await.is_empty());
    assert!(!store.expired(later, 30).await.contains(&waiting.id));
}
