use std::collections::BTreeMap;

use fieldsync_core::error::CoreError;
use fieldsync_core::failure::SubmissionFailure;
use fieldsync_db::DbError;

/// Errors from the HTTP collaborators.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (connection, DNS, TLS, body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("Server returned HTTP {0}")]
    HttpStatus(u16),

    /// Reading or moving a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived before the deadline.
    #[error("Request timed out after {0} ms")]
    TimedOut(u64),

    /// The response body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// The server answered and refused the request.
    #[error("Server rejected the request: {code}")]
    Rejected {
        code: String,
        description: Option<String>,
        params: BTreeMap<String, String>,
    },
}

impl TransportError {
    /// The submission failure this error is recorded as.
    ///
    /// Only an explicit rejection counts as a server failure; every other
    /// transport problem is a network failure.
    pub fn to_failure(&self) -> SubmissionFailure {
        match self {
            TransportError::Rejected {
                code,
                description,
                params,
            } => SubmissionFailure::Server {
                code: code.clone(),
                description: description.clone(),
                params: params.clone(),
            },
            TransportError::TimedOut(ms) => SubmissionFailure::timeout(*ms),
            _ => SubmissionFailure::Network,
        }
    }
}

/// Errors surfaced by the reports context and infrastructure sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The context was disposed; no new work is accepted.
    #[error("Reports context is shutting down")]
    ShuttingDown,
}
