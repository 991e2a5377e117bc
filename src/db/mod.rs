/// Database layer for Hearth
///
/// Manages the SQLite connection pool and embedded migrations, and provides
/// typed row models for accounts, relationships, content and verification.

pub mod models;

use crate::error::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
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
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> AppResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// In-memory pool with the schema applied.
///
/// A single connection keeps every query on the same in-memory database.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            "sqlite::memory:"
                .parse::<SqliteConnectOptions>()
                .unwrap()
                .foreign_keys(true),
        )
        .await
        .unwrap();

    run_migrations(&pool).await.unwrap();
    pool
}

/// Insert an account row directly, skipping signup checks and hashing.
/// Returns the new id.
#[cfg(test)]
pub async fn insert_test_account(pool: &SqlitePool, username: &str, is_private: bool) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now();

    sqlx::query(
        "INSERT INTO account (id, first_name, last_name, username, mail, password_hash,
             date_of_birth, gender, bio, profile_picture, is_private, created_at, updated_at,
             password_changed_at)
         VALUES (?1, ?2, 'Test', ?3, ?4, 'not-a-hash', '1990-01-01', 'other', NULL, NULL, ?5,
             ?6, ?6, ?6)",
    )
    .bind(&id)
    .bind(username)
    .bind(username)
    .bind(format!("{}@hearth.test", username))
    .bind(is_private)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    id
}
