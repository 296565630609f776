/// Client-generated report identifier. Immutable once assigned.
pub type ReportId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Stable cross-boundary identifier joining local and server records.
pub type Guid = String;
