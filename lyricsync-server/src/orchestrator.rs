//! Lyrics orchestrator
//!
//! Dispatches the three providers concurrently under a time budget and
//! merges their answers. Nothing here cancels work: a provider that misses
//! its budget keeps running on the request's [`PendingOps`] and still writes
//! the cache when it finishes.
//!
//! Per identity combination:
//! 1. lrclib is spawned first; its handle doubles as musixmatch's line source
//! 2. musixmatch and ttml (only with a duration) race `provider_timeout`
//! 3. lrclib gets until its `line_timeout` deadline, capped by a grace period
//!    that is longer when ttml found nothing

use crate::metadata::{MetadataResolver, TrackMetadata};
use crate::models::{LyricsQuery, LyricsResponse, LyricsResult};
use crate::pending::PendingOps;
use crate::services::{LineSource, LrclibClient, MusixmatchClient, RequestContext, TtmlClient};
use futures::FutureExt;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Time budgets (`[orchestrator]` TOML section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Budget for musixmatch and ttml
    pub provider_timeout_ms: u64,
    /// Hard deadline for lrclib, measured from dispatch
    pub line_timeout_ms: u64,
    /// Extra wait for lrclib when ttml found nothing
    pub line_grace_without_markup_ms: u64,
    /// Extra wait for lrclib when ttml found lyrics
    pub line_grace_with_markup_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 10_000,
            line_timeout_ms: 8_000,
            line_grace_without_markup_ms: 1_500,
            line_grace_with_markup_ms: 500,
        }
    }
}

impl OrchestratorSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn line_timeout(&self) -> Duration {
        Duration::from_millis(self.line_timeout_ms)
    }

    /// Grace period for the line provider after the others finished
    pub fn line_grace(&self, markup_found: bool) -> Duration {
        if markup_found {
            Duration::from_millis(self.line_grace_with_markup_ms)
        } else {
            Duration::from_millis(self.line_grace_without_markup_ms)
        }
    }
}

/// Incoming lookup
#[derive(Debug, Clone, Default)]
pub struct LyricsRequest {
    pub video_id: String,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<u32>,
    pub force_metadata_refetch: bool,
}

pub struct Orchestrator {
    lrclib: LrclibClient,
    musixmatch: MusixmatchClient,
    ttml: TtmlClient,
    metadata: Arc<dyn MetadataResolver>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        lrclib: LrclibClient,
        musixmatch: MusixmatchClient,
        ttml: TtmlClient,
        metadata: Arc<dyn MetadataResolver>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            lrclib,
            musixmatch,
            ttml,
            metadata,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn musixmatch(&self) -> &MusixmatchClient {
        &self.musixmatch
    }

    /// Resolve lyrics for one request
    ///
    /// Background work is left on `pending`; the caller drains it or hands
    /// it off. Never fails: "no lyrics" is an empty response.
    pub async fn get_lyrics(&self, request: LyricsRequest, pending: &PendingOps) -> LyricsResponse {
        let musixmatch = self.musixmatch.clone();
        pending.spawn("musixmatch warm-up", async move { musixmatch.warm_up().await });

        let metadata = self.resolve_metadata(&request).await;

        let mut response = LyricsResponse {
            video_id: request.video_id.clone(),
            song: metadata.song.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            duration: metadata.duration,
            ..Default::default()
        };

        let (Some(song), Some(artist)) = (metadata.song, metadata.artist) else {
            info!(video_id = %request.video_id, "No song/artist known, skipping providers");
            return response;
        };

        let base = LyricsQuery {
            video_id: request.video_id,
            song,
            artist,
            album: metadata.album,
            duration: metadata.duration,
        };

        for query in identity_combinations(base) {
            let (musixmatch, lrclib, ttml) = self.try_combination(&query, pending).await;
            let found = musixmatch.is_some() || lrclib.is_some() || ttml.is_some();
            response.musixmatch = musixmatch;
            response.lrclib = lrclib;
            response.ttml = ttml;
            if found {
                break;
            }
            debug!(song = %query.song, artist = %query.artist, "No lyrics for identity combination");
        }

        response.best = response.pick_best();
        info!(
            video_id = %response.video_id,
            best = ?response.best.as_ref().map(|best| best.format),
            musixmatch = response.musixmatch.is_some(),
            lrclib = response.lrclib.is_some(),
            ttml = response.ttml.is_some(),
            "Lyrics lookup complete"
        );
        response
    }

    async fn resolve_metadata(&self, request: &LyricsRequest) -> TrackMetadata {
        let mut metadata = TrackMetadata {
            song: non_blank(request.song.as_deref()),
            artist: non_blank(request.artist.as_deref()),
            album: non_blank(request.album.as_deref()),
            duration: request.duration,
        };

        if metadata.is_complete() && !request.force_metadata_refetch {
            return metadata;
        }

        match self.metadata.resolve(&request.video_id).await {
            Ok(Some(resolved)) => metadata.fill_from(resolved),
            Ok(None) => debug!(video_id = %request.video_id, "Metadata resolver had nothing"),
            Err(e) => warn!(video_id = %request.video_id, error = %e, "Metadata resolution failed"),
        }
        metadata
    }

    async fn try_combination(
        &self,
        query: &LyricsQuery,
        pending: &PendingOps,
    ) -> (Option<LyricsResult>, Option<LyricsResult>, Option<LyricsResult>) {
        let dispatched = Instant::now();

        let lrclib = self.lrclib.clone();
        let lrclib_ctx = RequestContext::new(pending.clone());
        let lrclib_query = query.clone();
        let lrclib_handle = pending.spawn("lrclib lookup", async move {
            lrclib.get_lyrics(&lrclib_ctx, &lrclib_query).await
        });
        let line_source: LineSource = async move { lrclib_handle.await.ok().flatten() }
            .boxed()
            .shared();

        let ctx = RequestContext::new(pending.clone()).with_line_source(line_source.clone());
        let budget = self.settings.provider_timeout();

        let musixmatch = {
            let client = self.musixmatch.clone();
            let ctx = ctx.clone();
            let query = query.clone();
            race(pending, "musixmatch lookup", budget, async move {
                client.get_lyrics(&ctx, &query).await
            })
        };

        let ttml = async {
            if query.duration.is_none() {
                return None;
            }
            let client = self.ttml.clone();
            let ctx = ctx.clone();
            let query = query.clone();
            race(pending, "ttml lookup", budget, async move {
                client.get_lyrics(&ctx, &query).await
            })
            .await
        };

        let (musixmatch, ttml) = tokio::join!(musixmatch, ttml);

        let deadline = dispatched + self.settings.line_timeout();
        let grace_end = Instant::now() + self.settings.line_grace(ttml.is_some());
        let lrclib = match tokio::time::timeout_at(deadline.min(grace_end), line_source).await {
            Ok(result) => result,
            Err(_) => {
                debug!(video_id = %query.video_id, "lrclib still running, answering without it");
                None
            }
        };

        (musixmatch, lrclib, ttml)
    }
}

/// Identity combinations to try in order; currently only the given one
fn identity_combinations(base: LyricsQuery) -> Vec<LyricsQuery> {
    vec![base]
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Run `future` on the pending set and wait at most `budget` for it
///
/// On timeout the task keeps running; only the answer is dropped.
async fn race<T, F>(pending: &PendingOps, label: &'static str, budget: Duration, future: F) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = Option<T>> + Send + 'static,
{
    let handle = pending.spawn(label, future);
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(operation = label, error = %e, "Provider task failed");
            None
        }
        Err(_) => {
            info!(operation = label, budget_ms = budget.as_millis() as u64, "Provider exceeded time budget");
            None
        }
    }
}
