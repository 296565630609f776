//! Durable backing for the report store.

use async_trait::async_trait;
use fieldsync_core::report::Report;
use fieldsync_core::types::ReportId;

use crate::error::DbError;
use crate::repositories::ReportRepo;
use crate::DbPool;

/// Where [`ReportStore`](crate::store::ReportStore) writes through to.
#[async_trait]
pub trait ReportPersistence: Send + Sync {
    /// Every stored report, in insertion order.
    async fn load_all(&self) -> Result<Vec<Report>, DbError>;
    async fn insert(&self, report: &Report) -> Result<(), DbError>;
    async fn update(&self, report: &Report) -> Result<(), DbError>;
    async fn delete(&self, id: ReportId) -> Result<(), DbError>;
}

/// SQLite-backed persistence using [`ReportRepo`].
#[derive(Clone)]
pub struct SqliteReportPersistence {
    pool: DbPool,
}

impl SqliteReportPersistence {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportPersistence for SqliteReportPersistence {
    async fn load_all(&self) -> Result<Vec<Report>, DbError> {
        ReportRepo::list(&self.pool).await
    }

    async fn insert(&self, report: &Report) -> Result<(), DbError> {
        ReportRepo::insert(&self.pool, report).await
    }

    async fn update(&self, report: &Report) -> Result<(), DbError> {
        if !ReportRepo::update(&self.pool, report).await? {
            // The row went missing (e.g. an earlier insert failed); restore it.
            ReportRepo::insert(&self.pool, report).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: ReportId) -> Result<(), DbError> {
        ReportRepo::delete(&self.pool, id).await?;
        Ok(())
    }
}
