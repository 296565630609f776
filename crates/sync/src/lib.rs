//! Report submission and infrastructure sync.
//!
//! Each locally created report gets a [`engine::SubmissionEngine`] that
//! walks it through connectivity check, photo upload and data
//! submission. [`context::ReportsContext`] owns the engines and is the
//! single entry point the rest of the application talks to.

pub mod api;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod machine;
pub mod photo;
pub mod prober;

pub use context::ReportsContext;
pub use error::{SyncError, TransportError};
pub use events::SyncEvent;
