//! Repository for the append-only `infrastructure_changes` log.
//!
//! Rows are never deleted here; they stay for user-visible history.

use fieldsync_core::infrastructure::{ChangeStatus, InfrastructureChange};
use fieldsync_core::types::Timestamp;

use crate::error::DbError;
use crate::models::format_timestamp;
use crate::models::infrastructure::InfrastructureChangeRow;
use crate::DbPool;

/// Column list for `infrastructure_changes` queries.
const COLUMNS: &str = "seq, id, change_type, status, guid, created, updated, infrastructure";

pub struct InfrastructureChangeRepo;

impl InfrastructureChangeRepo {
    /// Append a change to the log.
    pub async fn append(pool: &DbPool, change: &InfrastructureChange) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO infrastructure_changes \
             (id, change_type, status, guid, created, updated, infrastructure) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&change.id)
        .bind(change.change_type.as_str())
        .bind(change.status.as_str())
        .bind(&change.infrastructure.guid)
        .bind(format_timestamp(change.created))
        .bind(change.updated.map(format_timestamp))
        .bind(serde_json::to_string(&change.infrastructure)?)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the remote outcome (or in-flight state) of a change.
    ///
    /// Returns `false` if no change with `id` exists.
    pub async fn mark_outcome(
        pool: &DbPool,
        id: &str,
        status: ChangeStatus,
        updated: Option<Timestamp>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE infrastructure_changes SET status = ?2, updated = COALESCE(?3, updated) \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(updated.map(format_timestamp))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The whole log, oldest first.
    pub async fn list(pool: &DbPool) -> Result<Vec<InfrastructureChange>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM infrastructure_changes ORDER BY seq ASC");
        sqlx::query_as::<_, InfrastructureChangeRow>(&query)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(InfrastructureChangeRow::into_change)
            .collect()
    }

    /// Changes for a single record, oldest first.
    pub async fn list_for_guid(
        pool: &DbPool,
        guid: &str,
    ) -> Result<Vec<InfrastructureChange>, DbError> {
        let query = format!(
            "SELECT {COLUMNS} FROM infrastructure_changes WHERE guid = ?1 ORDER BY seq ASC"
        );
        sqlx::query_as::<_, InfrastructureChangeRow>(&query)
            .bind(guid)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(InfrastructureChangeRow::into_change)
            .collect()
    }
}
