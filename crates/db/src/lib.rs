//! PostgreSQL persistence for the document service.
//!
//! - [`models`] -- `FromRow` row structs and their conversion into core entities
//! - [`repositories`] -- zero-sized repos holding the SQL
//! - [`stores`] -- the core store traits implemented on top of the repos

pub mod models;
pub mod repositories;
pub mod stores;

use docforge_core::error::CoreError;
use sqlx::postgres::PgPoolOptions;

pub use stores::{PgScopeStore, PgVersionStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Map a sqlx error into the crate-wide error type.
///
/// Unique violations on `uq_` constraints become `Conflict`; anything else
/// is logged and reported as `Internal` without driver details.
pub fn map_db_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::RowNotFound => CoreError::NotFoundByKey {
            entity: "Row",
            key: "unknown".into(),
        },
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                CoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ))
            } else {
                tracing::error!(error = %db_err, "Unique violation on unnamed constraint");
                CoreError::Internal("Database error".into())
            }
        }
        other => {
            tracing::error!(error = %other, "Database error");
            CoreError::Internal("Database error".into())
        }
    }
}
