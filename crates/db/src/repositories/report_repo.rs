//! Repository for the `reports` table.

use chrono::Utc;
use fieldsync_core::report::{Report, ReportStatus};
use fieldsync_core::types::ReportId;

use crate::error::DbError;
use crate::models::format_timestamp;
use crate::models::report::ReportRow;
use crate::DbPool;

/// Column list for `reports` queries.
const COLUMNS: &str = "seq, id, status, created_at, record";

/// Provides persistence for locally created reports.
pub struct ReportRepo;

impl ReportRepo {
    /// Insert a new report row.
    pub async fn insert(pool: &DbPool, report: &Report) -> Result<(), DbError> {
        let record = serde_json::to_string(report)?;
        sqlx::query(
            "INSERT INTO reports (id, status, created_at, record, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(report.id.to_string())
        .bind(report.status().as_str())
        .bind(format_timestamp(report.created_at))
        .bind(record)
        .bind(format_timestamp(Utc::now()))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Overwrite the stored record and status. Returns `false` if no row
    /// matched.
    pub async fn update(pool: &DbPool, report: &Report) -> Result<bool, DbError> {
        let record = serde_json::to_string(report)?;
        let result = sqlx::query(
            "UPDATE reports SET status = ?2, record = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(report.id.to_string())
        .bind(report.status().as_str())
        .bind(record)
        .bind(format_timestamp(Utc::now()))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a report. Returns `false` if no row matched.
    pub async fn delete(pool: &DbPool, id: ReportId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?1")
            .bind(id.to_string())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a single report by id.
    pub async fn find_by_id(pool: &DbPool, id: ReportId) -> Result<Option<Report>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM reports WHERE id = ?1");
        sqlx::query_as::<_, ReportRow>(&query)
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?
            .map(ReportRow::into_report)
            .transpose()
    }

    /// All reports in insertion order.
    ///
    /// Rows that cannot be decoded are logged and skipped so one corrupt
    /// record does not block resuming the rest.
    pub async fn list(pool: &DbPool) -> Result<Vec<Report>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM reports ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, ReportRow>(&query)
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows))
    }

    /// Reports with the given status, in insertion order.
    pub async fn list_by_status(
        pool: &DbPool,
        status: ReportStatus,
    ) -> Result<Vec<Report>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM reports WHERE status = ?1 ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, ReportRow>(&query)
            .bind(status.as_str())
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows))
    }
}

fn decode_rows(rows: Vec<ReportRow>) -> Vec<Report> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match row.into_report() {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::warn!(report_id = %id, error = %e, "Skipping undecodable report row");
                    None
                }
            }
        })
        .collect()
}
