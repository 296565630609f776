//! Row models for the infrastructure change log and server snapshot.

use fieldsync_core::infrastructure::{ChangeStatus, ChangeType, Infrastructure, InfrastructureChange};
use fieldsync_core::types::Timestamp;
use sqlx::FromRow;

use super::parse_timestamp;
use crate::error::DbError;

/// A row from the `infrastructure_changes` table.
#[derive(Debug, Clone, FromRow)]
pub struct InfrastructureChangeRow {
    pub seq: i64,
    pub id: String,
    pub change_type: String,
    pub status: String,
    pub guid: String,
    pub created: String,
    pub updated: Option<String>,
    pub infrastructure: String,
}

impl InfrastructureChangeRow {
    pub fn into_change(self) -> Result<InfrastructureChange, DbError> {
        Ok(InfrastructureChange {
            id: self.id,
            change_type: ChangeType::parse(&self.change_type)?,
            status: ChangeStatus::parse(&self.status)?,
            created: parse_timestamp(&self.created)?,
            updated: self.updated.as_deref().map(parse_timestamp).transpose()?,
            infrastructure: serde_json::from_str(&self.infrastructure)?,
        })
    }
}

/// The last authoritative server fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct InfrastructureSnapshot {
    pub fetched_at: Timestamp,
    pub records: Vec<Infrastructure>,
}

/// The single row of the `infrastructure_snapshot` table.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub fetched_at: String,
    pub records: String,
}

impl SnapshotRow {
    pub fn into_snapshot(self) -> Result<InfrastructureSnapshot, DbError> {
        Ok(InfrastructureSnapshot {
            fetched_at: parse_timestamp(&self.fetched_at)?,
            records: serde_json::from_str(&self.records)?,
        })
    }
}
