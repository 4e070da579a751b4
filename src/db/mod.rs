/// Database layer
///
/// Manages the SQLite connection pool and migrations. Every query function in
/// the submodules takes an explicit `&mut SqliteConnection`, so a flow that
/// needs atomicity passes `&mut *tx` from one transaction to all of its steps.

pub mod account;
pub mod catalog;
pub mod consent;
pub mod profile;
pub mod tenant;

use crate::error::{ApiError, ApiResult};
use sqlx::{sqlite::SqlitePool, Sqlite, Transaction};
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> ApiResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Run migrations
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ApiError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Begin a transaction holding the write lock from its first statement
///
/// Flows that read before they write use this instead of `begin()`: a
/// deferred transaction cannot upgrade to a writer once another connection
/// has committed, while `BEGIN IMMEDIATE` waits out the busy timeout.
pub async fn begin_immediate(pool: &SqlitePool) -> ApiResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Column named by a SQLite unique-constraint failure, if that is what `err` is
///
/// SQLite reports `UNIQUE constraint failed: account.email`; partial indexes
/// report the indexed columns the same way.
pub fn unique_violation_field(err: &sqlx::Error) -> Option<String> {
    let db_err = match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => db_err,
        _ => return None,
    };

    let message = db_err.message();
    let columns = message.split(':').nth(1)?.trim();
    let first = columns.split(',').next()?.trim();
    let field = first.rsplit('.').next()?.to_string();
    Some(field)
}

/// Map a write error to `Conflict` when it is a unique violation
pub fn map_unique_violation(err: sqlx::Error) -> ApiError {
    match unique_violation_field(&err) {
        Some(field) => ApiError::conflict(field),
        None => ApiError::Database(err),
    }
}
