//! Hunting infrastructure records (towers, feeding sites, salt licks) and
//! the append-only log of local changes made to them.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{Guid, Timestamp};

/// Server id carried by records created on the device before their
/// first successful sync.
pub const LOCAL_SENTINEL_ID: i64 = -1;

/// A location in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single infrastructure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infrastructure {
    pub guid: Guid,
    /// Server-assigned id, [`LOCAL_SENTINEL_ID`] until synced.
    pub id: i64,
    #[serde(rename = "type")]
    pub infrastructure_type: String,
    pub location: GeoLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on_device: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_on_device: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// ChangeType / ChangeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "delete" => Ok(ChangeType::Delete),
            other => Err(CoreError::Validation(format!("Unknown change type: '{other}'"))),
        }
    }
}

/// Remote outcome of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Recorded locally, not yet sent.
    Pending,
    /// Currently being sent.
    Active,
    Success,
    Failure,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Active => "active",
            ChangeStatus::Success => "success",
            ChangeStatus::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(ChangeStatus::Pending),
            "active" => Ok(ChangeStatus::Active),
            "success" => Ok(ChangeStatus::Success),
            "failure" => Ok(ChangeStatus::Failure),
            other => Err(CoreError::Validation(format!(
                "Unknown change status: '{other}'"
            ))),
        }
    }

    /// Changes in these states still need to be sent.
    ///
    /// An `active` change found at the start of a push was interrupted
    /// mid-flight (crash, shutdown) and its outcome is unknown.
    pub fn needs_push(&self) -> bool {
        matches!(
            self,
            ChangeStatus::Pending | ChangeStatus::Active | ChangeStatus::Failure
        )
    }
}

// ---------------------------------------------------------------------------
// InfrastructureChange
// ---------------------------------------------------------------------------

/// One entry of the local change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureChange {
    pub id: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub status: ChangeStatus,
    pub created: Timestamp,
    /// Set once the remote outcome is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    /// Snapshot the change applies. Only `guid` matters for deletes.
    pub infrastructure: Infrastructure,
}

impl InfrastructureChange {
    /// A freshly recorded, not yet sent change.
    pub fn pending(change_type: ChangeType, infrastructure: Infrastructure, now: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            change_type,
            status: ChangeStatus::Pending,
            created: now,
            updated: None,
            infrastructure,
        }
    }

    /// A successful change whose outcome predates `fetched_at` is already
    /// reflected in (or superseded by) the server data.
    pub fn is_stale(&self, fetched_at: Timestamp) -> bool {
        match (self.status, self.updated) {
            (ChangeStatus::Success, Some(updated)) => fetched_at > updated,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
