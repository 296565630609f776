//! Locally created field reports and their lifecycle rules.
//!
//! A [`Report`] is created `pending`, moves to `loading` while a
//! submission attempt runs, and settles in `success` (terminal) or
//! `failure` (retryable). Status changes go through [`Report::apply`]
//! with a [`StatusUpdate`], which keeps `result`/`error` consistent with
//! the status: `result` is present exactly when the report succeeded and
//! `error` exactly when it failed.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::failure::SubmissionFailure;
use crate::types::{ReportId, Timestamp};

// ---------------------------------------------------------------------------
// ReportStatus
// ---------------------------------------------------------------------------

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_LOADING: &str = "loading";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILURE: &str = "failure";

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Loading,
    Success,
    Failure,
}

impl ReportStatus {
    /// String representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => STATUS_PENDING,
            ReportStatus::Loading => STATUS_LOADING,
            ReportStatus::Success => STATUS_SUCCESS,
            ReportStatus::Failure => STATUS_FAILURE,
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_PENDING => Ok(ReportStatus::Pending),
            STATUS_LOADING => Ok(ReportStatus::Loading),
            STATUS_SUCCESS => Ok(ReportStatus::Success),
            STATUS_FAILURE => Ok(ReportStatus::Failure),
            other => Err(CoreError::Validation(format!(
                "Unknown report status: '{other}'"
            ))),
        }
    }

    /// Reports still waiting for an outcome (used for badge counts).
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::Loading)
    }

    /// Whether a report in `self` may move to `next`.
    ///
    /// `loading -> loading` is allowed so a submission that re-enters
    /// network verification does not need a detour through `pending`.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (*self, next),
            (Pending, Loading)
                | (Loading, Loading | Success | Failure | Pending)
                | (Failure, Loading | Pending)
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload pieces
// ---------------------------------------------------------------------------

/// What kind of field record a report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Observation,
    Srva,
    Harvest,
    Damage,
    HuntRegistration,
}

/// A photo staged on the device for upload with the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    /// Local file path of the staged photo.
    pub uri: String,
}

/// Server confirmation data attached to a successful report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    /// Strap number assigned to a registered harvest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strap_number: Option<String>,
    /// Permit number assigned to an application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permit_number: Option<String>,
    /// Any other confirmation fields the server returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// StatusUpdate
// ---------------------------------------------------------------------------

/// A status change together with the data that status requires.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Pending,
    Loading,
    Success {
        result: SubmissionResult,
        in_african_swine_fever_zone: Option<bool>,
    },
    Failure(SubmissionFailure),
}

impl StatusUpdate {
    /// The status this update moves a report into.
    pub fn status(&self) -> ReportStatus {
        match self {
            StatusUpdate::Pending => ReportStatus::Pending,
            StatusUpdate::Loading => ReportStatus::Loading,
            StatusUpdate::Success { .. } => ReportStatus::Success,
            StatusUpdate::Failure(_) => ReportStatus::Failure,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Input for creating a report.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub id: ReportId,
    pub kind: Option<ReportKind>,
    pub edits: Vec<serde_json::Value>,
    pub photo: Option<PhotoRef>,
}

impl NewReport {
    /// A new report with a freshly generated, time-ordered id.
    pub fn new(kind: ReportKind, edits: Vec<serde_json::Value>) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            kind: Some(kind),
            edits,
            photo: None,
        }
    }

    /// Attach a staged photo.
    pub fn with_photo(mut self, uri: impl Into<String>) -> Self {
        self.photo = Some(PhotoRef { uri: uri.into() });
        self
    }
}

/// A locally created report awaiting (or past) submission.
///
/// The persisted layout is this struct's JSON form. Unknown fields are
/// ignored when reading so records written by newer versions still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReportKind>,
    status: ReportStatus,
    #[serde(default)]
    edits: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<SubmissionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<SubmissionFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_african_swine_fever_zone: Option<bool>,
}

impl Report {
    /// Create a `pending` report stamped with `created_at`.
    pub fn new(input: NewReport, created_at: Timestamp) -> Self {
        Self {
            id: input.id,
            created_at,
            kind: input.kind,
            status: ReportStatus::Pending,
            edits: input.edits,
            photo: input.photo,
            result: None,
            error: None,
            in_african_swine_fever_zone: None,
        }
    }

    pub fn status(&self) -> ReportStatus {
        self.status
    }

    /// The submission payload. Never changes after creation.
    pub fn edits(&self) -> &[serde_json::Value] {
        &self.edits
    }

    pub fn result(&self) -> Option<&SubmissionResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&SubmissionFailure> {
        self.error.as_ref()
    }

    pub fn in_african_swine_fever_zone(&self) -> Option<bool> {
        self.in_african_swine_fever_zone
    }

    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    /// Display title: the `id` field of the first edit, or the report id.
    pub fn title(&self) -> String {
        match self.edits.first().and_then(|edit| edit.get("id")) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => self.id.to_string(),
        }
    }

    /// Move the report to a new status, attaching or clearing
    /// `result`/`error` to match.
    pub fn apply(&mut self, update: StatusUpdate) -> Result<(), CoreError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }

        match update {
            StatusUpdate::Pending | StatusUpdate::Loading => {
                self.result = None;
                self.error = None;
            }
            StatusUpdate::Success {
                result,
                in_african_swine_fever_zone,
            } => {
                self.result = Some(result);
                self.error = None;
                self.in_african_swine_fever_zone = in_african_swine_fever_zone;
            }
            StatusUpdate::Failure(failure) => {
                self.result = None;
                self.error = Some(failure);
            }
        }
        self.status = next;
        Ok(())
    }

    /// Check that `result`/`error` agree with `status`.
    ///
    /// Records loaded from storage are checked with this before use.
    pub fn validate(&self) -> Result<(), CoreError> {
        let consistent = match self.status {
            ReportStatus::Success => self.result.is_some() && self.error.is_none(),
            ReportStatus::Failure => self.error.is_some() && self.result.is_none(),
            ReportStatus::Pending | ReportStatus::Loading => {
                self.result.is_none() && self.error.is_none()
            }
        };
        if consistent {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Report {} has status '{}' inconsistent with its result/error",
                self.id, self.status
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
