//! Database initialization
//!
//! Opens (or creates) the SQLite cache database and creates the cache
//! schema idempotently. Schema evolution beyond `CREATE ... IF NOT EXISTS`
//! is handled outside this crate.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL allows concurrent readers alongside the single writer
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_cache_schema(&pool).await?;

    Ok(pool)
}

/// Initialize a private in-memory database
///
/// A single long-lived connection is used: every SQLite in-memory
/// connection is its own database.
pub async fn init_in_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_cache_schema(&pool).await?;

    Ok(pool)
}

/// Create the lyric cache tables
///
/// - `tracks`: canonical identity per provider universe
/// - `track_mappings`: external `(platform, id)` → track
/// - `lyrics`: `(track, format)` → blob key
/// - `negative_mappings`: confirmed absence per `(platform, id)`
pub async fn create_cache_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            external_id TEXT,
            last_accessed_at INTEGER NOT NULL,
            last_updated_at INTEGER NOT NULL,
            UNIQUE (provider, external_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_mappings (
            source_platform TEXT NOT NULL,
            source_track_id TEXT NOT NULL,
            track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            PRIMARY KEY (source_platform, source_track_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_track_mappings_source_track_id ON track_mappings(source_track_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_track_mappings_track_id ON track_mappings(track_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lyrics (
            track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            format TEXT NOT NULL,
            blob_key TEXT NOT NULL UNIQUE,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (track_id, format)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS negative_mappings (
            source_platform TEXT NOT NULL,
            source_track_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (source_platform, source_track_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_negative_mappings_source_track_id ON negative_mappings(source_track_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
