//! On-device persistence for field reports and the infrastructure change
//! log, backed by SQLite through `sqlx`.
//!
//! - [`create_pool`], [`health_check`], [`run_migrations`] set up the
//!   database.
//! - [`repositories`] hold zero-sized repository structs with async
//!   query methods taking `&DbPool`.
//! - [`store::ReportStore`] is the in-process source of truth for report
//!   status, written through to a [`persistence::ReportPersistence`].

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub mod error;
pub mod models;
pub mod persistence;
pub mod repositories;
pub mod store;

pub use error::DbError;

pub type DbPool = sqlx::SqlitePool;

/// Create a connection pool from a database URL.
///
/// The database file is created if missing. `sqlite::memory:` URLs get a
/// single long-lived connection, since every new in-memory connection
/// would otherwise open an empty database.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };

    pool_options.connect_with(options).await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
