use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use std::str::FromStr;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::TARGET_DB;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

// Helper method to check if an sqlx error is a database lock error
pub trait DbLockErrorExt {
    fn is_database_lock_error(&self) -> bool;
}

impl DbLockErrorExt for sqlx::Error {
    fn is_database_lock_error(&self) -> bool {
        match self {
            sqlx::Error::Database(err) => err.message().contains("database is locked"),
            _ => false,
        }
    }
}

impl Database {
    /// Get access to the database pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(db_path: &str) -> Result<Self, sqlx::Error> {
        info!(target: TARGET_DB, "Creating database pool for: {}", db_path);

        let connect_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;

        info!(target: TARGET_DB, "Database pool created");

        let db = Database { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// A private in-memory store. A single connection keeps every query on
    /// the same database instance.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;

        let db = Database { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Open the configured path, falling back to an in-memory store only
    /// when the filesystem refuses writes. Any other open failure (bad path,
    /// corrupt file) surfaces to the caller rather than silently degrading
    /// to an ephemeral store.
    pub async fn open_with_fallback(db_path: &str) -> Result<Self, sqlx::Error> {
        match Database::new(db_path).await {
            Ok(db) => Ok(db),
            Err(e) if is_read_only_error(&e) => {
                warn!(
                    target: TARGET_DB,
                    "Filesystem is read-only at {}: {}; falling back to in-memory store",
                    db_path, e
                );
                Database::in_memory().await
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether an open failure means the filesystem refused writes, as opposed
/// to a bad path or a corrupt database file.
fn is_read_only_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("readonly database"),
        sqlx::Error::Io(io_err) => io_err.kind() == std::io::ErrorKind::PermissionDenied,
        _ => false,
    }
}
