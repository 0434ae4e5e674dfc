//! Database layer
//!
//! SQLite storage for:
//! - User accounts and credential hashes
//! - Sealed secrets and their team grants
//! - Teams and memberships
//! - The append-only audit log
//! - Shared rate limit counters

mod audit_repository;
mod secret_repository;
mod team_repository;
mod user_repository;

pub use audit_repository::AuditRepository;
pub use secret_repository::SecretRepository;
pub use team_repository::{MembershipRow, TeamRepository};
pub use user_repository::UserRepository;

#[cfg(test)]
pub(crate) use team_repository::pending_membership;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::config::DatabaseConfig;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and apply migrations
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let in_memory = config.url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));
    if in_memory {
        // Every connection to :memory: is a separate database
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Check database connectivity
pub async fn check_health(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database health check failed")?;
    Ok(())
}

/// Timestamps are stored as fixed-width RFC 3339 with microseconds so that
/// string order equals time order
pub(crate) fn format_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    DateTime::<Utc>::UNIX_EPOCH
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid UUID in database: {}", value))
}

/// Whether a repository error was caused by a UNIQUE or PRIMARY KEY conflict
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout_secs: 5,
    };
    init_pool(&config).await.expect("in-memory database")
}
