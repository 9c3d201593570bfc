//! Relational tier: tracks, track mappings and lyric blob rows

use lyricsync_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Track row reached through a `(platform, id)` mapping
#[derive(Debug, Clone)]
pub struct TrackRow {
    pub id: String,
    pub last_accessed_at: i64,
    pub last_updated_at: i64,
}

/// Look up the track a `(platform, id)` pair maps to
pub async fn find_mapped_track(
    pool: &SqlitePool,
    platform: &str,
    source_track_id: &str,
) -> Result<Option<TrackRow>> {
    let row = sqlx::query(
        r#"
        SELECT t.id, t.last_accessed_at, t.last_updated_at
        FROM track_mappings m
        JOIN tracks t ON t.id = m.track_id
        WHERE m.source_platform = ? AND m.source_track_id = ?
        "#,
    )
    .bind(platform)
    .bind(source_track_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| TrackRow {
        id: row.get("id"),
        last_accessed_at: row.get("last_accessed_at"),
        last_updated_at: row.get("last_updated_at"),
    }))
}

/// `(format, blob_key)` pairs stored for a track
pub async fn lyric_blob_keys(pool: &SqlitePool, track_id: &str) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT format, blob_key FROM lyrics WHERE track_id = ? ORDER BY format",
    )
    .bind(track_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Refresh the access timestamp
pub async fn touch_track(pool: &SqlitePool, track_id: &str, now: i64) -> Result<()> {
    sqlx::query("UPDATE tracks SET last_accessed_at = ? WHERE id = ?")
        .bind(now)
        .bind(track_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Resolve the canonical track for `(platform, source_track_id)`, creating
/// the track and mapping on first sight.
///
/// Resolution order: existing mapping, then a track with the same
/// `(provider, external_id)`, then a new track. Concurrent callers converge
/// on whichever mapping row wins; a track created by the loser is removed.
pub async fn resolve_track(
    pool: &SqlitePool,
    platform: &str,
    source_track_id: &str,
    external_id: Option<&str>,
    now: i64,
) -> Result<String> {
    let mut tx = pool.begin().await?;

    let mapped: Option<String> = sqlx::query_scalar(
        "SELECT track_id FROM track_mappings WHERE source_platform = ? AND source_track_id = ?",
    )
    .bind(platform)
    .bind(source_track_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(track_id) = mapped {
        tx.commit().await?;
        return Ok(track_id);
    }

    let candidate_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO tracks (id, provider, external_id, last_accessed_at, last_updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(provider, external_id) DO NOTHING
        "#,
    )
    .bind(&candidate_id)
    .bind(platform)
    .bind(external_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let track_id = match external_id {
        Some(external_id) => {
            sqlx::query_scalar::<_, String>(
                "SELECT id FROM tracks WHERE provider = ? AND external_id = ?",
            )
            .bind(platform)
            .bind(external_id)
            .fetch_one(&mut *tx)
            .await?
        }
        None => candidate_id.clone(),
    };

    sqlx::query(
        r#"
        INSERT INTO track_mappings (source_platform, source_track_id, track_id)
        VALUES (?, ?, ?)
        ON CONFLICT(source_platform, source_track_id) DO NOTHING
        "#,
    )
    .bind(platform)
    .bind(source_track_id)
    .bind(&track_id)
    .execute(&mut *tx)
    .await?;

    let winner: String = sqlx::query_scalar(
        "SELECT track_id FROM track_mappings WHERE source_platform = ? AND source_track_id = ?",
    )
    .bind(platform)
    .bind(source_track_id)
    .fetch_one(&mut *tx)
    .await?;

    if winner != candidate_id {
        sqlx::query(
            "DELETE FROM tracks WHERE id = ? AND NOT EXISTS (SELECT 1 FROM track_mappings WHERE track_id = ?)",
        )
        .bind(&candidate_id)
        .bind(&candidate_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(winner)
}

/// Point `(track, format)` at its blob and mark the track as freshly updated
pub async fn record_lyric(
    pool: &SqlitePool,
    track_id: &str,
    format: &str,
    blob_key: &str,
    now: i64,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO lyrics (track_id, format, blob_key, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(track_id, format) DO UPDATE SET
            blob_key = excluded.blob_key,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(track_id)
    .bind(format)
    .bind(blob_key)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE tracks SET last_updated_at = ?, last_accessed_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Tracks reached from a source id on any platform
pub async fn tracks_for_source(pool: &SqlitePool, source_track_id: &str) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT track_id FROM track_mappings WHERE source_track_id = ? ORDER BY track_id",
    )
    .bind(source_track_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Mappings into `track_id` from source ids other than `source_track_id`
pub async fn other_mapping_count(pool: &SqlitePool, track_id: &str, source_track_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM track_mappings WHERE track_id = ? AND source_track_id != ?",
    )
    .bind(track_id)
    .bind(source_track_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Drop every mapping from a source id, leaving the tracks in place
pub async fn delete_source_mappings(pool: &SqlitePool, source_track_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM track_mappings WHERE source_track_id = ?")
        .bind(source_track_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Delete tracks; lyric rows and mappings cascade
pub async fn delete_track(pool: &SqlitePool, track_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(track_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
