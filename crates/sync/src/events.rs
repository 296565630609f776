//! Events broadcast by the reports context.
//!
//! Subscribers (UI badges, report lists) receive these through
//! [`crate::ReportsContext::subscribe`]. A lagging subscriber may miss
//! events; the current state is always available from the context.

use fieldsync_core::types::ReportId;
use serde::Serialize;

use crate::machine::SubmissionState;

#[derive(Debug, Clone, Serialize)]
pub enum SyncEvent {
    /// A report was created and its engine attached.
    ReportAdded { report_id: ReportId },

    /// An engine moved to a new state, including photo progress updates.
    StateChanged {
        report_id: ReportId,
        state: SubmissionState,
    },

    /// A report and its engine were removed.
    ReportRemoved { report_id: ReportId },
}

impl SyncEvent {
    pub fn report_id(&self) -> ReportId {
        match self {
            SyncEvent::ReportAdded { report_id }
            | SyncEvent::StateChanged { report_id, .. }
            | SyncEvent::ReportRemoved { report_id } => *report_id,
        }
    }
}
