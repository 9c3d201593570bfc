//! Markup-synced lyrics client
//!
//! `GET {base}/getLyrics?s&a&al&d` answering `{"ttml": "<tt ...>"}`. Only
//! queried when the track duration is known.

use super::{resolve, send_json, Fetched, LyricsProvider, RequestContext, SharedCache, UpstreamError};
use crate::cache::LyricsCache;
use crate::models::{LyricsQuery, LyricsResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub const PLATFORM: &str = "ttml";

#[derive(Debug, Clone, Deserialize)]
struct TtmlResponse {
    #[serde(default)]
    ttml: Option<String>,
}

#[derive(Clone)]
pub struct TtmlClient {
    http: reqwest::Client,
    base_url: String,
    cache: SharedCache,
}

impl TtmlClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, cache: SharedCache) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        }
    }

    /// Cached or fetched TTML; `None` without a call when no duration is known
    pub async fn get_lyrics(&self, ctx: &RequestContext, query: &LyricsQuery) -> Option<LyricsResult> {
        if query.duration.is_none() {
            debug!(id = %query.video_id, "Skipping ttml lookup without duration");
            return None;
        }
        resolve(self, ctx, query).await
    }
}

#[async_trait]
impl LyricsProvider for TtmlClient {
    const PLATFORM: &'static str = PLATFORM;

    fn cache(&self) -> &LyricsCache {
        &self.cache
    }

    async fn fetch_upstream(
        &self,
        _ctx: &RequestContext,
        query: &LyricsQuery,
    ) -> Result<Option<Fetched>, UpstreamError> {
        let Some(duration) = query.duration else {
            return Err(UpstreamError::Parse("duration required".into()));
        };
        let url = format!("{}/getLyrics", self.base_url);

        let mut params = vec![
            ("s", query.song.clone()),
            ("a", query.artist.clone()),
            ("d", duration.to_string()),
        ];
        if let Some(album) = &query.album {
            params.push(("al", album.clone()));
        }

        debug!(id = %query.video_id, url = %url, "Querying ttml upstream");
        let response: TtmlResponse = send_json(self.http.get(&url).query(&params)).await?;

        let Some(ttml) = response.ttml.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        Ok(Some(Fetched {
            result: LyricsResult {
                ttml: Some(ttml),
                ..Default::default()
            },
            external_id: None,
        }))
    }
}
