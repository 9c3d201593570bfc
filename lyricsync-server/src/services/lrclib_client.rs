//! lrclib client: line-level synced and plain lyrics
//!
//! `GET {base}/api/get?track_name&artist_name&album_name&duration`

use super::{resolve, send_json, Fetched, LyricsProvider, RequestContext, SharedCache, UpstreamError};
use crate::alignment::lrc;
use crate::cache::LyricsCache;
use crate::models::{LyricsQuery, LyricsResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub const PLATFORM: &str = "lrclib";

/// lrclib track record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibTrack {
    id: i64,
    #[serde(default)]
    synced_lyrics: Option<String>,
    #[serde(default)]
    plain_lyrics: Option<String>,
    #[serde(default)]
    instrumental: bool,
}

#[derive(Clone)]
pub struct LrclibClient {
    http: reqwest::Client,
    base_url: String,
    cache: SharedCache,
}

impl LrclibClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, cache: SharedCache) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        }
    }

    /// Cached or fetched line-level lyrics
    pub async fn get_lyrics(&self, ctx: &RequestContext, query: &LyricsQuery) -> Option<LyricsResult> {
        resolve(self, ctx, query).await
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl LyricsProvider for LrclibClient {
    const PLATFORM: &'static str = PLATFORM;

    fn cache(&self) -> &LyricsCache {
        &self.cache
    }

    async fn fetch_upstream(
        &self,
        _ctx: &RequestContext,
        query: &LyricsQuery,
    ) -> Result<Option<Fetched>, UpstreamError> {
        let url = format!("{}/api/get", self.base_url);

        let mut params = vec![
            ("track_name", query.song.clone()),
            ("artist_name", query.artist.clone()),
        ];
        if let Some(album) = &query.album {
            params.push(("album_name", album.clone()));
        }
        if let Some(duration) = query.duration {
            params.push(("duration", duration.to_string()));
        }

        debug!(id = %query.video_id, url = %url, "Querying lrclib");
        let track: LrclibTrack = send_json(self.http.get(&url).query(&params)).await?;

        let line_synced = non_blank(track.synced_lyrics);
        let plain = non_blank(track.plain_lyrics)
            .or_else(|| line_synced.as_deref().map(lrc::strip_timestamps))
            .filter(|t| !t.is_empty());

        if line_synced.is_none() && plain.is_none() {
            debug!(id = %query.video_id, lrclib_id = track.id, instrumental = track.instrumental, "lrclib track has no lyrics");
            return Ok(None);
        }

        Ok(Some(Fetched {
            result: LyricsResult {
                line_synced,
                plain,
                ..Default::default()
            },
            external_id: Some(track.id.to_string()),
        }))
    }
}
