//! lyricsync-server library interface
//!
//! Synchronized lyrics lookup: three upstream providers raced under a time
//! budget, a multi-tier cache in front of each, and an alignment engine that
//! validates word-level timings against line-level ones.

pub mod alignment;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod pending;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use cache::{BlobStore, LyricsCache};
use chrono::{DateTime, Utc};
use config::{ServerSettings, ServiceConfig};
use metadata::MetadataResolver;
use orchestrator::Orchestrator;
use services::{
    build_http_client, LrclibClient, MusixmatchClient, MusixmatchSession, TtmlClient, UpstreamError,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub cache: Arc<LyricsCache>,
    /// Process-wide tracker receiving each request's background operations
    pub background: TaskTracker,
    pub server: ServerSettings,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, cache: Arc<LyricsCache>, server: ServerSettings) -> Self {
        Self {
            orchestrator,
            cache,
            background: TaskTracker::new(),
            server,
            startup_time: Utc::now(),
        }
    }

    /// Wait for every handed-off background operation
    pub async fn shutdown(&self) {
        self.background.close();
        self.background.wait().await;
    }
}

/// Build the cache facade over an initialized pool and blob store
pub fn build_cache(pool: SqlitePool, blobs: Arc<dyn BlobStore>, config: &ServiceConfig) -> Arc<LyricsCache> {
    Arc::new(LyricsCache::new(pool, blobs, config.cache.clone()))
}

/// Wire provider clients and the orchestrator from configuration
///
/// The musixmatch session is passed in: one session per process.
pub fn build_orchestrator(
    config: &ServiceConfig,
    cache: Arc<LyricsCache>,
    session: Arc<MusixmatchSession>,
    metadata: Arc<dyn MetadataResolver>,
) -> Result<Orchestrator, UpstreamError> {
    let upstream = &config.upstream;
    let http = build_http_client(upstream.request_timeout(), true)?;
    let manual_redirects = build_http_client(upstream.request_timeout(), false)?;

    let lrclib = LrclibClient::new(http.clone(), &upstream.lrclib_base_url, cache.clone());
    let ttml = TtmlClient::new(http, &upstream.ttml_base_url, cache.clone());
    let musixmatch = MusixmatchClient::new(
        manual_redirects,
        &upstream.musixmatch_base_url,
        &upstream.musixmatch_app_id,
        session,
        cache,
        upstream.line_source_wait(),
    );

    Ok(Orchestrator::new(
        lrclib,
        musixmatch,
        ttml,
        metadata,
        config.orchestrator.clone(),
    ))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::lyrics_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
