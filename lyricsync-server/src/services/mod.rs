//! Upstream lyric provider clients
//!
//! Every provider answers `LyricsResult | None` through the same cache
//! policy ([`resolve`]):
//! 1. fresh negative entry: `None`
//! 2. stale negative entry: `None`, refetch in the background
//! 3. positive entry: answer it, refetch in the background with
//!    probability `refetch_chance` once it is older than `stale_threshold`
//! 4. miss: fetch upstream, persist in the background
//!
//! Only [`UpstreamError::NotFound`] (or a resolved-but-empty answer) is
//! negative-cached. Everything else is transient and retried next time.

pub mod lrclib_client;
pub mod musixmatch_client;
pub mod musixmatch_session;
pub mod ttml_client;

pub use lrclib_client::LrclibClient;
pub use musixmatch_client::MusixmatchClient;
pub use musixmatch_session::{MusixmatchSession, TokenCheckout, TokenState};
pub use ttml_client::TtmlClient;

use crate::cache::{CachedLyrics, LyricsCache};
use crate::models::{LyricsQuery, LyricsResult};
use crate::pending::PendingOps;
use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use lyricsync_common::time::now_millis;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// User agent sent to every upstream
pub const USER_AGENT: &str = concat!("lyricsync/", env!("CARGO_PKG_VERSION"));

/// Upstream call errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream definitively reported absence
    #[error("Not found")]
    NotFound,

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication rejected")]
    Unauthorized,

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("No session token available")]
    NoToken,
}

impl UpstreamError {
    /// True when the absence may be negative-cached
    pub fn is_definitive_absence(&self) -> bool {
        matches!(self, UpstreamError::NotFound)
    }
}

/// In-flight line-level result shared between providers of one request
pub type LineSource = Shared<BoxFuture<'static, Option<LyricsResult>>>;

/// Cache handle held by provider clients
pub type SharedCache = Arc<LyricsCache>;

/// Per-request state handed to providers
#[derive(Clone, Default)]
pub struct RequestContext {
    /// Where background writes and refetches are tracked
    pub pending: PendingOps,
    /// Line-level transcript being fetched concurrently, if any
    pub line_source: Option<LineSource>,
}

impl RequestContext {
    pub fn new(pending: PendingOps) -> Self {
        Self {
            pending,
            line_source: None,
        }
    }

    pub fn with_line_source(mut self, source: LineSource) -> Self {
        self.line_source = Some(source);
        self
    }
}

/// Upstream answer ready to be cached
#[derive(Debug, Clone)]
pub struct Fetched {
    pub result: LyricsResult,
    /// Provider-specific track identity shared by equivalent source ids
    pub external_id: Option<String>,
}

#[async_trait]
pub trait LyricsProvider: Clone + Send + Sync + 'static {
    /// Cache platform tag
    const PLATFORM: &'static str;

    fn cache(&self) -> &LyricsCache;

    /// Build a result from cached contents
    fn from_cached(&self, cached: CachedLyrics) -> LyricsResult {
        LyricsResult::from_contents(&cached.contents)
    }

    /// Query upstream
    ///
    /// `Ok(None)` means the upstream resolved the query but had nothing;
    /// like `Err(NotFound)` it is cached as a confirmed absence.
    async fn fetch_upstream(
        &self,
        ctx: &RequestContext,
        query: &LyricsQuery,
    ) -> Result<Option<Fetched>, UpstreamError>;
}

/// Answer a query from cache or upstream
pub async fn resolve<P: LyricsProvider>(
    provider: &P,
    ctx: &RequestContext,
    query: &LyricsQuery,
) -> Option<LyricsResult> {
    let cache = provider.cache();
    let id = query.video_id.as_str();

    match cache.get_negative(P::PLATFORM, id).await {
        Ok(lookup) if lookup.hit => {
            debug!(platform = P::PLATFORM, id, stale = lookup.stale, "Negative cache hit");
            if lookup.stale {
                spawn_refetch(provider, ctx, query);
            }
            return None;
        }
        Ok(_) => {}
        Err(e) => warn!(platform = P::PLATFORM, id, error = %e, "Negative cache lookup failed"),
    }

    match cache.get_positive(&ctx.pending, P::PLATFORM, id).await {
        Ok(Some(cached)) => {
            debug!(platform = P::PLATFORM, id, "Positive cache hit");
            let policy = cache.settings().refetch_policy();
            if policy.should_refetch(cached.last_updated_at, now_millis()) {
                spawn_refetch(provider, ctx, query);
            }
            return Some(provider.from_cached(cached));
        }
        Ok(None) => {}
        Err(e) => warn!(platform = P::PLATFORM, id, error = %e, "Positive cache lookup failed"),
    }

    fetch_and_store(provider, ctx, query).await
}

fn spawn_refetch<P: LyricsProvider>(provider: &P, ctx: &RequestContext, query: &LyricsQuery) {
    debug!(platform = P::PLATFORM, id = %query.video_id, "Scheduling background refetch");
    let provider = provider.clone();
    let background = ctx.clone();
    let query = query.clone();
    ctx.pending.spawn("background refetch", async move {
        fetch_and_store(&provider, &background, &query).await;
    });
}

/// Fetch upstream and schedule the cache writes
///
/// Writes run on the request's pending set, one task per format, so the
/// answer never waits on storage.
pub async fn fetch_and_store<P: LyricsProvider>(
    provider: &P,
    ctx: &RequestContext,
    query: &LyricsQuery,
) -> Option<LyricsResult> {
    let id = query.video_id.as_str();

    let fetched = match provider.fetch_upstream(ctx, query).await {
        Ok(Some(fetched)) if !fetched.result.is_empty() => fetched,
        Ok(_) => {
            debug!(platform = P::PLATFORM, id, "Upstream resolved with no lyrics");
            save_negative(provider, ctx, id);
            return None;
        }
        Err(e) if e.is_definitive_absence() => {
            debug!(platform = P::PLATFORM, id, "Upstream reported not found");
            save_negative(provider, ctx, id);
            return None;
        }
        Err(e) => {
            warn!(platform = P::PLATFORM, id, error = %e, "Upstream lookup failed");
            return None;
        }
    };

    for (format, content) in fetched.result.contents() {
        let provider = provider.clone();
        let id = id.to_string();
        let content = content.to_string();
        let external_id = fetched.external_id.clone();
        ctx.pending.spawn_logged("save lyrics", async move {
            provider
                .cache()
                .save_positive(P::PLATFORM, &id, format, &content, external_id.as_deref())
                .await
        });
    }

    Some(fetched.result)
}

fn save_negative<P: LyricsProvider>(provider: &P, ctx: &RequestContext, id: &str) {
    let provider = provider.clone();
    let id = id.to_string();
    ctx.pending.spawn_logged("save negative entry", async move {
        provider.cache().save_negative(P::PLATFORM, &id).await
    });
}

/// HTTP client for upstream calls
///
/// `follow_redirects = false` leaves 3xx handling to the caller.
pub fn build_http_client(
    timeout: Duration,
    follow_redirects: bool,
) -> Result<reqwest::Client, UpstreamError> {
    let redirect = if follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(redirect)
        .build()
        .map_err(|e| UpstreamError::Network(e.to_string()))
}

/// Send a request and decode a JSON body, mapping statuses onto [`UpstreamError`]
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|e| UpstreamError::Network(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(UpstreamError::NotFound);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::Unauthorized);
    }
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| UpstreamError::Parse(e.to_string()))
}
