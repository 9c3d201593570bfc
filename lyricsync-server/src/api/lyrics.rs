//! Lyrics lookup endpoint
//!
//! `GET /lyrics?videoId=..&song=..&artist=..&album=..&duration=..&forceMetadataRefetch=..`
//!
//! Always answers 200 with a [`LyricsResponse`] once the request is valid;
//! "no lyrics" is an empty response. The edge-cache lifetime is long when
//! synced lyrics were found and short otherwise.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::models::LyricsResponse;
use crate::orchestrator::LyricsRequest;
use crate::pending::PendingOps;
use crate::AppState;

/// Longest accepted media identifier
pub const MAX_VIDEO_ID_LEN: usize = 64;

/// Raw query parameters; typed parsing happens in [`LyricsParams::into_request`]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsParams {
    pub video_id: Option<String>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<String>,
    pub force_metadata_refetch: Option<String>,
}

impl LyricsParams {
    pub fn into_request(self) -> ApiResult<LyricsRequest> {
        let video_id = validate_video_id(self.video_id.as_deref())?;
        let duration = self.duration.as_deref().map(parse_duration).transpose()?.flatten();
        let force_metadata_refetch = self
            .force_metadata_refetch
            .as_deref()
            .map(parse_flag)
            .transpose()?
            .unwrap_or(false);

        Ok(LyricsRequest {
            video_id,
            song: self.song,
            artist: self.artist,
            album: self.album,
            duration,
            force_metadata_refetch,
        })
    }
}

/// 1..=64 characters of `[A-Za-z0-9_-]`
pub fn validate_video_id(raw: Option<&str>) -> ApiResult<String> {
    let Some(id) = raw else {
        return Err(ApiError::BadRequest("videoId is required".to_string()));
    };
    if id.is_empty() || id.len() > MAX_VIDEO_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "videoId must be 1 to {} characters",
            MAX_VIDEO_ID_LEN
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ApiError::BadRequest(
            "videoId may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(id.to_string())
}

/// Seconds, possibly fractional; blank means unknown
fn parse_duration(raw: &str) -> ApiResult<Option<u32>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 && secs <= f64::from(u32::MAX) => {
            Ok(Some(secs.round() as u32))
        }
        _ => Err(ApiError::BadRequest(format!("Invalid duration: {:?}", raw))),
    }
}

fn parse_flag(raw: &str) -> ApiResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid forceMetadataRefetch: {:?}",
            raw
        ))),
    }
}

/// `Cache-Control` value for a response
pub fn cache_control(response: &LyricsResponse, found_secs: u64, empty_secs: u64) -> String {
    let max_age = if response.has_synced() {
        found_secs
    } else {
        empty_secs
    };
    format!("public, max-age={}", max_age)
}

/// GET /lyrics
pub async fn get_lyrics(
    State(state): State<AppState>,
    params: Result<Query<LyricsParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = params.into_request()?;
    debug!(video_id = %request.video_id, "Lyrics request");

    let pending = PendingOps::new();
    let response = state.orchestrator.get_lyrics(request, &pending).await;
    pending.hand_off(&state.background);

    let cache_control = cache_control(
        &response,
        state.server.edge_ttl_found_secs,
        state.server.edge_ttl_empty_secs,
    );
    Ok(([(header::CACHE_CONTROL, cache_control)], Json(response)).into_response())
}

/// Build lyrics routes
pub fn lyrics_routes() -> Router<AppState> {
    Router::new().route("/lyrics", get(get_lyrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LyricsResult;

    #[test]
    fn test_video_id_validation() {
        assert_eq!(validate_video_id(Some("dQw4w9WgXcQ")).unwrap(), "dQw4w9WgXcQ");
        assert!(validate_video_id(Some("a-b_c")).is_ok());
        assert!(validate_video_id(Some(&"x".repeat(64))).is_ok());

        assert!(validate_video_id(None).is_err());
        assert!(validate_video_id(Some("")).is_err());
        assert!(validate_video_id(Some(&"x".repeat(65))).is_err());
        assert!(validate_video_id(Some("../etc")).is_err());
        assert!(validate_video_id(Some("id with space")).is_err());
        assert!(validate_video_id(Some("ünïcode")).is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("212").unwrap(), Some(212));
        assert_eq!(parse_duration("212.6").unwrap(), Some(213));
        assert_eq!(parse_duration(" ").unwrap(), None);
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("NaN").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("false").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_cache_control_depends_on_synced_content() {
        let mut response = LyricsResponse::empty("vid");
        assert_eq!(cache_control(&response, 600, 60), "public, max-age=60");

        response.lrclib = Some(LyricsResult {
            plain: Some("text".into()),
            ..Default::default()
        });
        assert_eq!(cache_control(&response, 600, 60), "public, max-age=60");

        response.ttml = Some(LyricsResult {
            ttml: Some("<tt/>".into()),
            ..Default::default()
        });
        assert_eq!(cache_control(&response, 600, 60), "public, max-age=600");
    }
}
