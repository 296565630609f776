//! Domain core for offline field report submission.
//!
//! Pure logic only: the report model and its status rules, the
//! submission failure taxonomy and user-facing message table, the
//! infrastructure change log model and its reconciliation against
//! server data, retention rules, and configuration. No I/O lives here.

pub mod config;
pub mod error;
pub mod failure;
pub mod infrastructure;
pub mod messages;
pub mod reconcile;
pub mod report;
pub mod retention;
pub mod time_spent;
pub mod types;
