//! Repository for the single-row `infrastructure_snapshot` table.

use fieldsync_core::infrastructure::Infrastructure;
use fieldsync_core::types::Timestamp;

use crate::error::DbError;
use crate::models::format_timestamp;
use crate::models::infrastructure::{InfrastructureSnapshot, SnapshotRow};
use crate::DbPool;

pub struct InfrastructureSnapshotRepo;

impl InfrastructureSnapshotRepo {
    /// Replace the stored snapshot with a fresh server fetch.
    pub async fn save(
        pool: &DbPool,
        fetched_at: Timestamp,
        records: &[Infrastructure],
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO infrastructure_snapshot (id, fetched_at, records) VALUES (1, ?1, ?2) \
             ON CONFLICT (id) DO UPDATE SET fetched_at = excluded.fetched_at, records = excluded.records",
        )
        .bind(format_timestamp(fetched_at))
        .bind(serde_json::to_string(records)?)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// The last stored snapshot, if any fetch has succeeded yet.
    pub async fn load(pool: &DbPool) -> Result<Option<InfrastructureSnapshot>, DbError> {
        sqlx::query_as::<_, SnapshotRow>(
            "SELECT fetched_at, records FROM infrastructure_snapshot WHERE id = 1",
        )
        .fetch_optional(pool)
        .await?
        .map(SnapshotRow::into_snapshot)
        .transpose()
    }
}
