//! Retention rules for settled reports.
//!
//! Successful reports are kept for a configurable number of days so the
//! user can still look up the confirmation (e.g. strap number), then
//! swept. Reports without a successful outcome are never expired: losing
//! an unsent report would lose the user's data.

use chrono::{DateTime, Duration, Utc};

use crate::report::{Report, ReportStatus};
use crate::types::Timestamp;

/// Default number of days a successful report is kept.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Upper bound accepted by configuration.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Reports created before this instant are old enough to expire.
///
/// A window reaching past the representable range gives the earliest
/// timestamp, so nothing expires.
pub fn expiry_cutoff(now: Timestamp, retention_days: i64) -> Timestamp {
    Duration::try_days(retention_days.max(0))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whether `report` should be removed by the retention sweep.
pub fn is_expired(report: &Report, now: Timestamp, retention_days: i64) -> bool {
    report.status() == ReportStatus::Success
        && report.created_at < expiry_cutoff(now, retention_days)
}
