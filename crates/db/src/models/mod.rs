//! Row types and their conversion into domain values.
//!
//! Timestamps are stored as RFC 3339 text in UTC with millisecond
//! precision.

use chrono::{DateTime, SecondsFormat, Utc};
use fieldsync_core::error::CoreError;
use fieldsync_core::types::Timestamp;

pub mod infrastructure;
pub mod report;

/// Format a timestamp for storage.
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CoreError::Validation(format!("Invalid stored timestamp '{raw}': {e}")))
}
