//! Row model for the `reports` table.

use fieldsync_core::report::Report;
use sqlx::FromRow;

use crate::error::DbError;

/// A row from the `reports` table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    pub seq: i64,
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub record: String,
}

impl ReportRow {
    /// Decode the stored JSON record.
    ///
    /// Fields unknown to this version are ignored. A record whose status
    /// disagrees with its result/error is rejected.
    pub fn into_report(self) -> Result<Report, DbError> {
        let report: Report = serde_json::from_str(&self.record)?;
        report.validate()?;
        Ok(report)
    }
}
