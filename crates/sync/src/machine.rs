//! Submission state machine.
//!
//! A pure transition table: [`transition`] maps the current state and an
//! event to the next state, or `None` when the event means nothing in
//! that state. The engine runs the side effects; nothing here touches
//! I/O.
//!
//! ```text
//! idle ──SUBMIT──> verifyingNetwork
//! verifyingNetwork ──available──> uploadingPhoto   (has photo)
//!                  ──available──> submittingData   (no photo)
//!                  ──unavailable─> waitingForNetwork
//! waitingForNetwork ──recheck──> verifyingNetwork
//! uploadingPhoto ──uploaded──> submittingData
//!                ──failed────> failure
//! submittingData ──accepted──> success
//!                ──failed────> failure
//! failure ──RETRY──> verifyingNetwork
//! ```

use fieldsync_core::failure::SubmissionFailure;
use fieldsync_core::report::{Report, ReportStatus, StatusUpdate, SubmissionResult};
use serde::Serialize;

/// Where a report is in its submission lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SubmissionState {
    Idle,
    VerifyingNetwork,
    WaitingForNetwork,
    UploadingPhoto {
        /// Fraction of the photo sent, in `[0, 1]`.
        progress: f32,
    },
    SubmittingData,
    Success {
        result: SubmissionResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        in_african_swine_fever_zone: Option<bool>,
    },
    Failure {
        failure: SubmissionFailure,
    },
}

impl SubmissionState {
    /// The state an engine starts in for a report loaded from storage.
    ///
    /// An interrupted `loading` report restarts from `idle`.
    pub fn for_report(report: &Report) -> Self {
        match report.status() {
            ReportStatus::Pending | ReportStatus::Loading => SubmissionState::Idle,
            ReportStatus::Success => SubmissionState::Success {
                result: report.result().cloned().unwrap_or_default(),
                in_african_swine_fever_zone: report.in_african_swine_fever_zone(),
            },
            ReportStatus::Failure => SubmissionState::Failure {
                failure: report
                    .error()
                    .cloned()
                    .unwrap_or(SubmissionFailure::Network),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::VerifyingNetwork => "verifyingNetwork",
            SubmissionState::WaitingForNetwork => "waitingForNetwork",
            SubmissionState::UploadingPhoto { .. } => "uploadingPhoto",
            SubmissionState::SubmittingData => "submittingData",
            SubmissionState::Success { .. } => "success",
            SubmissionState::Failure { .. } => "failure",
        }
    }

    /// Whether the engine is working and ignores commands.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SubmissionState::VerifyingNetwork
                | SubmissionState::WaitingForNetwork
                | SubmissionState::UploadingPhoto { .. }
                | SubmissionState::SubmittingData
        )
    }

    pub fn is_waiting_for_network(&self) -> bool {
        matches!(self, SubmissionState::WaitingForNetwork)
    }

    pub fn photo_progress(&self) -> Option<f32> {
        match self {
            SubmissionState::UploadingPhoto { progress } => Some(*progress),
            _ => None,
        }
    }

    /// The persisted status this state corresponds to.
    pub fn report_status(&self) -> ReportStatus {
        match self {
            SubmissionState::Idle => ReportStatus::Pending,
            SubmissionState::Success { .. } => ReportStatus::Success,
            SubmissionState::Failure { .. } => ReportStatus::Failure,
            _ => ReportStatus::Loading,
        }
    }

    /// The store update that records this state.
    pub fn status_update(&self) -> StatusUpdate {
        match self {
            SubmissionState::Idle => StatusUpdate::Pending,
            SubmissionState::Success {
                result,
                in_african_swine_fever_zone,
            } => StatusUpdate::Success {
                result: result.clone(),
                in_african_swine_fever_zone: *in_african_swine_fever_zone,
            },
            SubmissionState::Failure { failure } => StatusUpdate::Failure(failure.clone()),
            _ => StatusUpdate::Loading,
        }
    }
}

/// Inputs to the state machine: user commands and step outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionEvent {
    Submit,
    Retry,
    NetworkAvailable,
    NetworkUnavailable,
    /// The wait before the next connectivity check elapsed.
    RecheckNetwork,
    PhotoProgress(f32),
    PhotoUploaded,
    PhotoFailed(SubmissionFailure),
    DataAccepted {
        result: SubmissionResult,
        in_african_swine_fever_zone: Option<bool>,
    },
    DataFailed(SubmissionFailure),
}

/// The next state, or `None` if `event` is ignored in `state`.
pub fn transition(
    state: &SubmissionState,
    event: SubmissionEvent,
    has_photo: bool,
) -> Option<SubmissionState> {
    use SubmissionEvent as E;
    use SubmissionState as S;

    let next = match (state, event) {
        (S::Idle, E::Submit | E::Retry) => S::VerifyingNetwork,
        (S::Failure { .. }, E::Retry) => S::VerifyingNetwork,

        (S::VerifyingNetwork, E::NetworkAvailable) if has_photo => {
            S::UploadingPhoto { progress: 0.0 }
        }
        (S::VerifyingNetwork, E::NetworkAvailable) => S::SubmittingData,
        (S::VerifyingNetwork, E::NetworkUnavailable) => S::WaitingForNetwork,

        (S::WaitingForNetwork, E::RecheckNetwork) => S::VerifyingNetwork,

        (S::UploadingPhoto { .. }, E::PhotoProgress(p)) => S::UploadingPhoto {
            progress: p.clamp(0.0, 1.0),
        },
        (S::UploadingPhoto { .. }, E::PhotoUploaded) => S::SubmittingData,
        (S::UploadingPhoto { .. }, E::PhotoFailed(failure)) => S::Failure { failure },

        (
            S::SubmittingData,
            E::DataAccepted {
                result,
                in_african_swine_fever_zone,
            },
        ) => S::Success {
            result,
            in_african_swine_fever_zone,
        },
        (S::SubmittingData, E::DataFailed(failure)) => S::Failure { failure },

        _ => return None,
    };
    Some(next)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
