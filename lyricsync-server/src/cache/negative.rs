//! Negative cache tier: confirmed absence per `(platform, id)`

use lyricsync_common::time::age_millis;
use lyricsync_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;

/// Tri-state negative lookup
///
/// `hit == false` is a miss. A stale hit is still a hit: the caller answers
/// "no content" but should revalidate in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NegativeLookup {
    pub hit: bool,
    pub stale: bool,
}

impl NegativeLookup {
    pub const MISS: NegativeLookup = NegativeLookup {
        hit: false,
        stale: false,
    };

    /// Classify an entry's `created_at` against the platform TTL
    pub fn classify(created_at: Option<i64>, now: i64, ttl: Duration) -> Self {
        match created_at {
            None => Self::MISS,
            Some(created_at) => NegativeLookup {
                hit: true,
                stale: u128::from(age_millis(created_at, now)) > ttl.as_millis(),
            },
        }
    }
}

pub async fn find_created_at(
    pool: &SqlitePool,
    platform: &str,
    source_track_id: &str,
) -> Result<Option<i64>> {
    let created_at = sqlx::query_scalar::<_, i64>(
        "SELECT created_at FROM negative_mappings WHERE source_platform = ? AND source_track_id = ?",
    )
    .bind(platform)
    .bind(source_track_id)
    .fetch_optional(pool)
    .await?;

    Ok(created_at)
}

/// Insert or refresh an entry's `created_at`
pub async fn upsert(pool: &SqlitePool, platform: &str, source_track_id: &str, now: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO negative_mappings (source_platform, source_track_id, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(source_platform, source_track_id) DO UPDATE SET
            created_at = excluded.created_at
        "#,
    )
    .bind(platform)
    .bind(source_track_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete(pool: &SqlitePool, platform: &str, source_track_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM negative_mappings WHERE source_platform = ? AND source_track_id = ?",
    )
    .bind(platform)
    .bind(source_track_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete entries for a source id on every platform
pub async fn delete_for_source(pool: &SqlitePool, source_track_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM negative_mappings WHERE source_track_id = ?")
        .bind(source_track_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
