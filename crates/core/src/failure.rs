//! Submission failure taxonomy.
//!
//! Every network or storage problem met while submitting a report ends
//! up as one of three [`SubmissionFailure`] variants. The persisted form
//! is internally tagged on `type`, e.g. `{"type":"timeout","timeout":30000}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `type` tag for transport-level failures.
pub const FAILURE_NETWORK: &str = "network";
/// `type` tag for deadline expiry.
pub const FAILURE_TIMEOUT: &str = "timeout";
/// `type` tag for application-level rejections.
pub const FAILURE_SERVER: &str = "server";

/// Why a submission attempt ended in `failure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubmissionFailure {
    /// No usable response: connection refused, DNS failure, non-2xx
    /// transport status, local photo staging error.
    Network,

    /// The configured deadline elapsed before a response arrived.
    Timeout {
        /// The deadline that expired, in milliseconds.
        timeout: u64,
    },

    /// The server answered and rejected the report.
    Server {
        /// Application error code, looked up in the message table.
        code: String,
        /// Free-form server text, shown only for diagnostics.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Template substitution values for the user-facing message.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, String>,
    },
}

impl SubmissionFailure {
    /// A server rejection with no description or parameters.
    pub fn server(code: impl Into<String>) -> Self {
        SubmissionFailure::Server {
            code: code.into(),
            description: None,
            params: BTreeMap::new(),
        }
    }

    /// Timeout failure carrying the expired deadline.
    pub fn timeout(timeout_ms: u64) -> Self {
        SubmissionFailure::Timeout {
            timeout: timeout_ms,
        }
    }

    /// The `type` tag of this failure.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionFailure::Network => FAILURE_NETWORK,
            SubmissionFailure::Timeout { .. } => FAILURE_TIMEOUT,
            SubmissionFailure::Server { .. } => FAILURE_SERVER,
        }
    }
}

impl std::fmt::Display for SubmissionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionFailure::Network => write!(f, "network failure"),
            SubmissionFailure::Timeout { timeout } => write!(f, "timed out after {timeout} ms"),
            SubmissionFailure::Server { code, .. } => write!(f, "server rejected: {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
