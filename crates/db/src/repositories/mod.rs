//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&DbPool` as the first argument.

pub mod infrastructure_change_repo;
pub mod infrastructure_snapshot_repo;
pub mod report_repo;

pub use infrastructure_change_repo::InfrastructureChangeRepo;
pub use infrastructure_snapshot_repo::InfrastructureSnapshotRepo;
pub use report_repo::ReportRepo;
