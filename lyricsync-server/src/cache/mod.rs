//! Multi-tier lyric cache
//!
//! Three tiers behind one facade:
//! - relational metadata (tracks, mappings, blob rows) in SQLite
//! - compressed lyric blobs in a [`BlobStore`]
//! - negative entries recording confirmed upstream absence
//!
//! The facade returns errors; provider-facing code logs and swallows them so
//! a cache failure never blocks already-fetched lyrics.

pub mod blob_store;
pub mod compression;
pub mod negative;
pub mod tracks;

pub use blob_store::{blob_key, BlobStore, FsBlobStore, MemoryBlobStore};
pub use negative::NegativeLookup;

use crate::models::LyricFormat;
use crate::pending::PendingOps;
use crate::utils::retry_on_lock;
use futures::future::join_all;
use lyricsync_common::time::{age_millis, now_millis};
use lyricsync_common::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-platform negative TTLs applied when the `[cache.negative_ttl_secs]`
/// table leaves a platform out
const BUILTIN_NEGATIVE_TTL_SECS: [(&str, u64); 3] = [
    ("lrclib", 3 * 24 * 3600),
    ("musixmatch", 7 * 24 * 3600),
    ("ttml", 24 * 3600),
];

/// Cache policy settings (`[cache]` TOML section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Minimum interval between access-timestamp writes for one track
    pub access_refresh_interval_secs: u64,
    /// Age after which positive entries become eligible for revalidation
    pub stale_threshold_secs: u64,
    /// Probability that a stale read triggers a background refetch
    pub refetch_chance: f64,
    /// Negative-cache TTL per platform
    pub negative_ttl_secs: HashMap<String, u64>,
    /// Negative-cache TTL for platforms without an explicit entry
    pub default_negative_ttl_secs: u64,
    /// Upper bound on retrying a write that hit SQLite lock contention
    pub max_lock_wait_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let negative_ttl_secs = BUILTIN_NEGATIVE_TTL_SECS
            .iter()
            .map(|&(platform, secs)| (platform.to_string(), secs))
            .collect();

        Self {
            access_refresh_interval_secs: 24 * 3600,
            stale_threshold_secs: 14 * 24 * 3600,
            refetch_chance: 0.1,
            negative_ttl_secs,
            default_negative_ttl_secs: 3 * 24 * 3600,
            max_lock_wait_ms: 2_000,
        }
    }
}

impl CacheSettings {
    pub fn negative_ttl(&self, platform: &str) -> Duration {
        let secs = self
            .negative_ttl_secs
            .get(platform)
            .copied()
            .or_else(|| {
                BUILTIN_NEGATIVE_TTL_SECS
                    .iter()
                    .find(|(name, _)| *name == platform)
                    .map(|&(_, secs)| secs)
            })
            .unwrap_or(self.default_negative_ttl_secs);
        Duration::from_secs(secs)
    }

    pub fn refetch_policy(&self) -> RefetchPolicy {
        RefetchPolicy {
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            refetch_chance: self.refetch_chance,
        }
    }
}

/// Probabilistic stale-while-revalidate policy for positive entries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefetchPolicy {
    pub stale_threshold: Duration,
    pub refetch_chance: f64,
}

impl RefetchPolicy {
    pub fn is_stale(&self, last_updated_at: i64, now: i64) -> bool {
        u128::from(age_millis(last_updated_at, now)) > self.stale_threshold.as_millis()
    }

    /// Decide with an explicit roll in `[0, 1)`
    pub fn should_refetch_with(&self, last_updated_at: i64, now: i64, roll: f64) -> bool {
        self.is_stale(last_updated_at, now) && roll < self.refetch_chance
    }

    pub fn should_refetch(&self, last_updated_at: i64, now: i64) -> bool {
        if !self.is_stale(last_updated_at, now) {
            return false;
        }
        let roll: f64 = rand::thread_rng().gen();
        roll < self.refetch_chance
    }
}

/// Positive cache hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedLyrics {
    pub track_id: String,
    pub contents: HashMap<LyricFormat, String>,
    pub last_updated_at: i64,
}

/// Rows and blobs removed by [`LyricsCache::delete_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub tracks: u64,
    /// Mappings dropped from tracks still shared with other ids
    pub mappings: u64,
    pub blobs: u64,
    pub negative_entries: u64,
}

/// Facade over the relational, blob and negative tiers
pub struct LyricsCache {
    pool: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    settings: CacheSettings,
}

impl LyricsCache {
    pub fn new(pool: SqlitePool, blobs: Arc<dyn BlobStore>, settings: CacheSettings) -> Self {
        Self {
            pool,
            blobs,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn max_lock_wait(&self) -> Duration {
        Duration::from_millis(self.settings.max_lock_wait_ms)
    }

    /// Read every stored format for `(platform, id)`
    ///
    /// Refreshes the access timestamp in the background when it is older
    /// than the refresh interval. Rows whose blob is gone are skipped; if no
    /// blob remains the lookup is a miss.
    pub async fn get_positive(
        &self,
        pending: &PendingOps,
        platform: &str,
        id: &str,
    ) -> Result<Option<CachedLyrics>> {
        let Some(track) = tracks::find_mapped_track(&self.pool, platform, id).await? else {
            return Ok(None);
        };

        let now = now_millis();
        let refresh_interval = Duration::from_secs(self.settings.access_refresh_interval_secs);
        if u128::from(age_millis(track.last_accessed_at, now)) > refresh_interval.as_millis() {
            let pool = self.pool.clone();
            let track_id = track.id.clone();
            pending.spawn_logged("touch track", async move {
                tracks::touch_track(&pool, &track_id, now).await
            });
        }

        let keys = tracks::lyric_blob_keys(&self.pool, &track.id).await?;
        let reads = keys.into_iter().filter_map(|(format, key)| {
            match format.parse::<LyricFormat>() {
                Ok(format) => Some(async move {
                    let content = self.read_blob(&key).await;
                    (format, key, content)
                }),
                Err(e) => {
                    warn!(track_id = %track.id, error = %e, "Skipping unknown stored format");
                    None
                }
            }
        });

        let mut contents = HashMap::new();
        for (format, key, content) in join_all(reads).await {
            match content {
                Ok(Some(text)) => {
                    contents.insert(format, text);
                }
                Ok(None) => {
                    debug!(blob_key = %key, "Blob missing for metadata row, treating as miss");
                }
                Err(e) => {
                    warn!(blob_key = %key, error = %e, "Failed to read cached blob");
                }
            }
        }

        if contents.is_empty() {
            return Ok(None);
        }

        Ok(Some(CachedLyrics {
            track_id: track.id,
            contents,
            last_updated_at: track.last_updated_at,
        }))
    }

    async fn read_blob(&self, key: &str) -> Result<Option<String>> {
        match self.blobs.get(key).await? {
            Some(bytes) => compression::decompress(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Persist one format for `(platform, id)`
    ///
    /// Creates the track and mapping on first sight, writes the blob, then
    /// records the blob row. Clears any negative entry for the same key.
    /// Calls for different formats of one track may run concurrently.
    pub async fn save_positive(
        &self,
        platform: &str,
        id: &str,
        format: LyricFormat,
        content: &str,
        external_id: Option<&str>,
    ) -> Result<()> {
        let now = now_millis();

        let track_id = retry_on_lock("resolve track", self.max_lock_wait(), || {
            tracks::resolve_track(&self.pool, platform, id, external_id, now)
        })
        .await?;

        let key = blob_key(&track_id, format.as_str());
        let bytes = compression::compress(content)?;
        self.blobs.put(&key, bytes).await?;

        retry_on_lock("record lyric", self.max_lock_wait(), || {
            tracks::record_lyric(&self.pool, &track_id, format.as_str(), &key, now)
        })
        .await?;

        retry_on_lock("clear negative entry", self.max_lock_wait(), || {
            negative::delete(&self.pool, platform, id)
        })
        .await?;

        debug!(platform, id, format = %format, track_id = %track_id, "Saved lyrics to cache");
        Ok(())
    }

    pub async fn get_negative(&self, platform: &str, id: &str) -> Result<NegativeLookup> {
        let created_at = negative::find_created_at(&self.pool, platform, id).await?;
        Ok(NegativeLookup::classify(
            created_at,
            now_millis(),
            self.settings.negative_ttl(platform),
        ))
    }

    /// Record confirmed absence, refreshing `created_at` if already present
    pub async fn save_negative(&self, platform: &str, id: &str) -> Result<()> {
        let now = now_millis();
        retry_on_lock("save negative entry", self.max_lock_wait(), || {
            negative::upsert(&self.pool, platform, id, now)
        })
        .await?;
        debug!(platform, id, "Saved negative cache entry");
        Ok(())
    }

    /// Purge every tier for one identifier across all platforms
    ///
    /// A track unified with other source ids keeps its lyrics; only this
    /// id's mapping to it is removed.
    pub async fn delete_all(&self, id: &str) -> Result<PurgeSummary> {
        let mut summary = PurgeSummary::default();

        for track_id in tracks::tracks_for_source(&self.pool, id).await? {
            if tracks::other_mapping_count(&self.pool, &track_id, id).await? > 0 {
                debug!(id, track_id = %track_id, "Track shared with other ids, keeping it");
                continue;
            }
            // Blobs first: a row without a blob reads as a miss
            for (_, key) in tracks::lyric_blob_keys(&self.pool, &track_id).await? {
                match self.blobs.delete(&key).await {
                    Ok(()) => summary.blobs += 1,
                    Err(e) => warn!(blob_key = %key, error = %e, "Failed to delete blob"),
                }
            }
            summary.tracks += tracks::delete_track(&self.pool, &track_id).await?;
        }
        summary.mappings = tracks::delete_source_mappings(&self.pool, id).await?;

        summary.negative_entries = negative::delete_for_source(&self.pool, id).await?;

        tracing::info!(
            id,
            tracks = summary.tracks,
            mappings = summary.mappings,
            blobs = summary.blobs,
            negative_entries = summary.negative_entries,
            "Purged cached lyrics"
        );
        Ok(summary)
    }
}
