//! musixmatch client: word-level (richsync) lyrics
//!
//! Every call goes to `{base}/{method}` and answers an envelope
//! `{"message": {"header": {"status_code": ..}, "body": ..}}`; the envelope
//! status is authoritative over the HTTP status. Redirects are followed by
//! hand so `Set-Cookie` headers on intermediate hops reach the session jar.
//!
//! Miss path: token, `matcher.track.get`, then by capability:
//! - richsync: `track.richsync.get`, aligned against a line-level transcript
//!   (the request's in-flight lrclib result, else `track.subtitle.get`)
//! - subtitles only: `track.subtitle.get` as line-level lyrics
//! - neither: confirmed absence

use super::musixmatch_session::TokenCheckout;
use super::{
    resolve, Fetched, LyricsProvider, MusixmatchSession, RequestContext, SharedCache,
    UpstreamError,
};
use crate::alignment::{self, lrc, tokens};
use crate::cache::LyricsCache;
use crate::models::{LyricsQuery, LyricsResult};
use async_trait::async_trait;
use lyricsync_common::time::now_millis;
use reqwest::header::{COOKIE, LOCATION};
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const PLATFORM: &str = "musixmatch";

/// Redirect hops followed per call
pub const MAX_REDIRECTS: usize = 5;

/// Delay before the second token attempt; doubled per attempt
const TOKEN_BACKOFF_MS: u64 = 50;

/// Token backoff ceiling
const MAX_TOKEN_BACKOFF_MS: u64 = 400;

/// Prefix of the placeholder token handed out to unsupported clients
const UPGRADE_ONLY_TOKEN: &str = "UpgradeOnly";

#[derive(Debug, Deserialize)]
struct Envelope {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    header: Header,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct Header {
    status_code: u16,
    #[serde(default)]
    hint: Option<String>,
}

/// Flags arrive as `0`/`1` or as booleans
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        None => false,
    })
}

/// Matched upstream track
#[derive(Debug, Clone, Deserialize)]
pub struct MatchedTrack {
    pub track_id: i64,
    pub commontrack_id: i64,
    #[serde(default, deserialize_with = "flag")]
    pub has_richsync: bool,
    #[serde(default, deserialize_with = "flag")]
    pub has_subtitles: bool,
    #[serde(default, deserialize_with = "flag")]
    pub instrumental: bool,
}

#[derive(Clone)]
pub struct MusixmatchClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    session: Arc<MusixmatchSession>,
    cache: SharedCache,
    line_source_wait: Duration,
}

impl MusixmatchClient {
    /// `http` must not follow redirects itself
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        session: Arc<MusixmatchSession>,
        cache: SharedCache,
        line_source_wait: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            session,
            cache,
            line_source_wait,
        }
    }

    pub fn session(&self) -> &Arc<MusixmatchSession> {
        &self.session
    }

    /// Cached or fetched word-level lyrics
    pub async fn get_lyrics(&self, ctx: &RequestContext, query: &LyricsQuery) -> Option<LyricsResult> {
        resolve(self, ctx, query).await
    }

    /// Acquire a token ahead of the first lookup
    pub async fn warm_up(&self) {
        if self.ensure_token().await.is_none() {
            debug!("Musixmatch warm-up finished without a token");
        }
    }

    /// Current token, acquiring one if needed; `None` once disabled
    pub async fn ensure_token(&self) -> Option<String> {
        match self.session.checkout() {
            TokenCheckout::Ready(token) => return Some(token),
            TokenCheckout::Disabled => return None,
            TokenCheckout::Acquire => {}
        }

        let max_attempts = self.session.max_attempts();
        let mut backoff_ms = TOKEN_BACKOFF_MS;
        for attempt in 1..=max_attempts {
            match self.request_token().await {
                Ok(token) => return self.session.complete(token),
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Musixmatch token request failed");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_TOKEN_BACKOFF_MS);
            }
        }

        self.session.fail();
        None
    }

    async fn request_token(&self) -> Result<String, UpstreamError> {
        let body = self
            .call("token.get", &[("user_language", "en".to_string()), ("t", now_millis().to_string())], None)
            .await?;

        match body.get("user_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() && !token.starts_with(UPGRADE_ONLY_TOKEN) => {
                Ok(token.to_string())
            }
            Some(_) => Err(UpstreamError::NoToken),
            None => Err(UpstreamError::Parse("missing user_token".into())),
        }
    }

    /// One API call: manual redirects, cookie replay, envelope decoding
    async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, method))
            .map_err(|e| UpstreamError::Parse(format!("invalid url: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("app_id", &self.app_id);
            pairs.append_pair("format", "json");
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
            if let Some(token) = token {
                pairs.append_pair("usertoken", token);
            }
        }

        let mut redirects = 0;
        let response = loop {
            let mut request = self.http.get(url.clone());
            if let Some(cookies) = self.session.cookie_header() {
                request = request.header(COOKIE, cookies);
            }

            let response = request
                .send()
                .await
                .map_err(|e| UpstreamError::Network(e.to_string()))?;
            self.session.store_cookies(response.headers());

            if !response.status().is_redirection() {
                break response;
            }

            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(UpstreamError::TooManyRedirects);
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| UpstreamError::Parse("redirect without location".into()))?;
            url = response
                .url()
                .join(location)
                .map_err(|e| UpstreamError::Parse(format!("invalid redirect: {}", e)))?;
            debug!(method, hop = redirects, location = %url, "Following musixmatch redirect");
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::Unauthorized);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status(status.as_u16(), error_text));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        match envelope.message.header.status_code {
            200 => Ok(envelope.message.body),
            401 => Err(UpstreamError::Unauthorized),
            404 => Err(UpstreamError::NotFound),
            code => Err(UpstreamError::Status(
                code,
                envelope.message.header.hint.unwrap_or_default(),
            )),
        }
    }

    /// Authenticated call; a rejection drops the session token
    async fn authed_call(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<Value, UpstreamError> {
        let result = self.call(method, params, Some(token)).await;
        if matches!(result, Err(UpstreamError::Unauthorized)) {
            self.session.invalidate();
        }
        result
    }

    async fn match_track(&self, token: &str, query: &LyricsQuery) -> Result<MatchedTrack, UpstreamError> {
        let mut params = vec![
            ("q_track", query.song.clone()),
            ("q_artist", query.artist.clone()),
        ];
        if let Some(album) = &query.album {
            params.push(("q_album", album.clone()));
        }
        if let Some(duration) = query.duration {
            params.push(("q_duration", duration.to_string()));
        }

        let body = self.authed_call("matcher.track.get", &params, token).await?;
        // An unmatched query answers an empty body rather than a 404
        let Some(track) = body.get("track") else {
            return Err(UpstreamError::NotFound);
        };
        serde_json::from_value(track.clone()).map_err(|e| UpstreamError::Parse(e.to_string()))
    }

    async fn richsync(&self, token: &str, track: &MatchedTrack) -> Result<Vec<alignment::RichsyncLine>, UpstreamError> {
        let body = self
            .authed_call(
                "track.richsync.get",
                &[("commontrack_id", track.commontrack_id.to_string())],
                token,
            )
            .await?;
        let raw = body
            .pointer("/richsync/richsync_body")
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::Parse("missing richsync_body".into()))?;
        tokens::parse_richsync(raw).ok_or_else(|| UpstreamError::Parse("malformed richsync_body".into()))
    }

    async fn subtitle(&self, token: &str, track: &MatchedTrack) -> Result<String, UpstreamError> {
        let body = self
            .authed_call(
                "track.subtitle.get",
                &[
                    ("commontrack_id", track.commontrack_id.to_string()),
                    ("subtitle_format", "lrc".to_string()),
                ],
                token,
            )
            .await?;
        body.pointer("/subtitle/subtitle_body")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::Parse("missing subtitle_body".into()))
    }

    /// Line-level transcript for alignment
    async fn line_level(&self, ctx: &RequestContext, token: &str, track: &MatchedTrack) -> Option<String> {
        if let Some(source) = &ctx.line_source {
            match tokio::time::timeout(self.line_source_wait, source.clone()).await {
                Ok(Some(result)) if result.line_synced.is_some() => {
                    debug!(commontrack_id = track.commontrack_id, "Aligning against concurrent line-level result");
                    return result.line_synced;
                }
                Ok(_) => {}
                Err(_) => debug!("Line-level source not ready in time"),
            }
        }

        if !track.has_subtitles {
            return None;
        }
        match self.subtitle(token, track).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(commontrack_id = track.commontrack_id, error = %e, "No subtitle for alignment");
                None
            }
        }
    }
}

/// Plain text from line-level lyrics, else from the word-level lines
fn derive_plain(line_synced: Option<&str>, richsync: &[alignment::RichsyncLine]) -> Option<String> {
    line_synced
        .map(lrc::strip_timestamps)
        .filter(|text| !text.is_empty())
        .or_else(|| Some(tokens::richsync_text(richsync)).filter(|text| !text.trim().is_empty()))
}

/// Align on the blocking pool; LCS over long transcripts is CPU-bound
async fn fuse_off_executor(
    richsync: Vec<alignment::RichsyncLine>,
    line_level: Option<String>,
) -> Result<LyricsResult, UpstreamError> {
    tokio::task::spawn_blocking(move || {
        let mut result = alignment::fuse(&richsync, line_level.as_deref());
        result.plain = derive_plain(result.line_synced.as_deref(), &richsync);
        result
    })
    .await
    .map_err(|e| UpstreamError::Parse(format!("alignment task failed: {}", e)))
}

#[async_trait]
impl LyricsProvider for MusixmatchClient {
    const PLATFORM: &'static str = PLATFORM;

    fn cache(&self) -> &LyricsCache {
        &self.cache
    }

    async fn fetch_upstream(
        &self,
        ctx: &RequestContext,
        query: &LyricsQuery,
    ) -> Result<Option<Fetched>, UpstreamError> {
        let token = self.ensure_token().await.ok_or(UpstreamError::NoToken)?;
        let track = self.match_track(&token, query).await?;
        let external_id = Some(track.commontrack_id.to_string());

        debug!(
            id = %query.video_id,
            track_id = track.track_id,
            commontrack_id = track.commontrack_id,
            has_richsync = track.has_richsync,
            has_subtitles = track.has_subtitles,
            "Matched musixmatch track"
        );

        if track.has_richsync {
            match self.richsync(&token, &track).await {
                Ok(richsync) if !richsync.is_empty() => {
                    let line_level = self.line_level(ctx, &token, &track).await;
                    let result = fuse_off_executor(richsync, line_level).await?;
                    return Ok(Some(Fetched { result, external_id }));
                }
                // Advertised but unavailable: fall back to subtitles
                Ok(_) | Err(UpstreamError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }

        if track.has_subtitles {
            let subtitle = self.subtitle(&token, &track).await?;
            let plain = Some(lrc::strip_timestamps(&subtitle)).filter(|text| !text.is_empty());
            return Ok(Some(Fetched {
                result: LyricsResult {
                    line_synced: Some(subtitle),
                    plain,
                    ..Default::default()
                },
                external_id,
            }));
        }

        debug!(id = %query.video_id, instrumental = track.instrumental, "Musixmatch track has no synced lyrics");
        Ok(None)
    }
}
