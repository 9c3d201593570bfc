//! Test Helper Utilities
//!
//! Shared utilities for testing lyricsync-server against local mock upstreams

#![allow(dead_code)]

pub mod upstream;

pub use upstream::{spawn_upstream, CallLog};

use lyricsync_common::db::init_in_memory_database;
use lyricsync_server::cache::{CacheSettings, LyricsCache, MemoryBlobStore};
use lyricsync_server::config::ServiceConfig;
use lyricsync_server::models::LyricsQuery;
use lyricsync_server::services::build_http_client;
use std::sync::Arc;
use std::time::Duration;

/// Cache over an in-memory database and blob store
pub async fn memory_cache() -> Arc<LyricsCache> {
    memory_cache_with(CacheSettings::default()).await
}

pub async fn memory_cache_with(settings: CacheSettings) -> Arc<LyricsCache> {
    let pool = init_in_memory_database().await.unwrap();
    Arc::new(LyricsCache::new(pool, Arc::new(MemoryBlobStore::new()), settings))
}

/// Client following redirects (lrclib, ttml)
pub fn http_client() -> reqwest::Client {
    build_http_client(Duration::from_secs(5), true).unwrap()
}

/// Client leaving redirects to the caller (musixmatch)
pub fn manual_redirect_client() -> reqwest::Client {
    build_http_client(Duration::from_secs(5), false).unwrap()
}

pub fn query(video_id: &str) -> LyricsQuery {
    LyricsQuery {
        video_id: video_id.to_string(),
        song: "Never Gonna Give You Up".to_string(),
        artist: "Rick Astley".to_string(),
        album: Some("Whenever You Need Somebody".to_string()),
        duration: Some(213),
    }
}

/// Configuration pointing every provider at local mock upstreams
pub fn test_config(lrclib: &str, ttml: &str, musixmatch: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.upstream.lrclib_base_url = lrclib.to_string();
    config.upstream.ttml_base_url = ttml.to_string();
    config.upstream.musixmatch_base_url = musixmatch.to_string();
    config.upstream.request_timeout_secs = 5;
    config
}

/// Wait (bounded) until `probe` holds; polls every 10ms
pub async fn eventually<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
