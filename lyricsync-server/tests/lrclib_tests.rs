//! lrclib client against a mock upstream
//!
//! - Success is answered and persisted in the background
//! - 404 and empty answers are negative-cached
//! - Transient failures are not cached and are retried next time

mod helpers;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use helpers::{http_client, memory_cache, query, spawn_upstream, CallLog};
use lyricsync_server::models::LyricFormat;
use lyricsync_server::pending::PendingOps;
use lyricsync_server::services::{LrclibClient, RequestContext};
use serde_json::json;
use std::collections::HashMap;

const SYNCED: &str = "[00:18.50]We're no strangers to love\n[00:22.80]You know the rules and so do I";

/// Mock lrclib answering by `track_name`
fn lrclib_router(log: CallLog, status: StatusCode) -> Router {
    Router::new().route(
        "/api/get",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let log = log.clone();
            async move {
                log.record(format!(
                    "get track_name={} duration={}",
                    params.get("track_name").cloned().unwrap_or_default(),
                    params.get("duration").cloned().unwrap_or_default()
                ));
                match status {
                    StatusCode::OK => Json(json!({
                        "id": 4242,
                        "trackName": params.get("track_name"),
                        "syncedLyrics": SYNCED,
                        "plainLyrics": null,
                        "instrumental": false,
                    }))
                    .into_response(),
                    other => (other, Json(json!({"message": "nope"}))).into_response(),
                }
            }
        }),
    )
}

#[tokio::test]
async fn test_success_is_returned_and_cached() {
    let log = CallLog::default();
    let base = spawn_upstream(lrclib_router(log.clone(), StatusCode::OK)).await;
    let cache = memory_cache().await;
    let client = LrclibClient::new(http_client(), &base, cache.clone());

    let pending = PendingOps::new();
    let ctx = RequestContext::new(pending.clone());
    let result = client.get_lyrics(&ctx, &query("vid1")).await.expect("lyrics");
    assert_eq!(result.line_synced.as_deref(), Some(SYNCED));
    // Plain text derived from the synced transcript
    assert_eq!(
        result.plain.as_deref(),
        Some("We're no strangers to love\nYou know the rules and so do I")
    );
    assert_eq!(log.entries(), vec!["get track_name=Never Gonna Give You Up duration=213"]);
    pending.drain().await;

    let cached = cache
        .get_positive(&PendingOps::new(), "lrclib", "vid1")
        .await
        .unwrap()
        .expect("cached after drain");
    assert_eq!(cached.contents.get(&LyricFormat::Synced).map(String::as_str), Some(SYNCED));
    assert!(cached.contents.contains_key(&LyricFormat::Plain));

    // Second lookup is served from cache
    let pending = PendingOps::new();
    let again = client
        .get_lyrics(&RequestContext::new(pending.clone()), &query("vid1"))
        .await
        .expect("cached lyrics");
    pending.drain().await;
    assert_eq!(again.line_synced.as_deref(), Some(SYNCED));
    assert_eq!(log.count("get"), 1);
}

#[tokio::test]
async fn test_not_found_is_negative_cached() {
    let log = CallLog::default();
    let base = spawn_upstream(lrclib_router(log.clone(), StatusCode::NOT_FOUND)).await;
    let cache = memory_cache().await;
    let client = LrclibClient::new(http_client(), &base, cache.clone());

    let pending = PendingOps::new();
    assert!(client
        .get_lyrics(&RequestContext::new(pending.clone()), &query("missing"))
        .await
        .is_none());
    pending.drain().await;

    let negative = cache.get_negative("lrclib", "missing").await.unwrap();
    assert!(negative.hit);
    assert!(!negative.stale);

    let pending = PendingOps::new();
    assert!(client
        .get_lyrics(&RequestContext::new(pending.clone()), &query("missing"))
        .await
        .is_none());
    pending.drain().await;
    assert_eq!(log.count("get"), 1, "fresh negative entry must suppress upstream calls");
}

#[tokio::test]
async fn test_server_error_is_not_cached() {
    let log = CallLog::default();
    let base = spawn_upstream(lrclib_router(log.clone(), StatusCode::INTERNAL_SERVER_ERROR)).await;
    let cache = memory_cache().await;
    let client = LrclibClient::new(http_client(), &base, cache.clone());

    for _ in 0..2 {
        let pending = PendingOps::new();
        assert!(client
            .get_lyrics(&RequestContext::new(pending.clone()), &query("flaky"))
            .await
            .is_none());
        pending.drain().await;
    }

    assert!(!cache.get_negative("lrclib", "flaky").await.unwrap().hit);
    assert_eq!(log.count("get"), 2, "transient failures are retried");
}

#[tokio::test]
async fn test_track_without_lyrics_is_negative_cached() {
    let router = Router::new().route(
        "/api/get",
        get(|| async {
            Json(json!({
                "id": 7,
                "syncedLyrics": null,
                "plainLyrics": "",
                "instrumental": true,
            }))
        }),
    );
    let base = spawn_upstream(router).await;
    let cache = memory_cache().await;
    let client = LrclibClient::new(http_client(), &base, cache.clone());

    let pending = PendingOps::new();
    assert!(client
        .get_lyrics(&RequestContext::new(pending.clone()), &query("instrumental"))
        .await
        .is_none());
    pending.drain().await;

    assert!(cache.get_negative("lrclib", "instrumental").await.unwrap().hit);
}

#[tokio::test]
async fn test_unreachable_upstream_is_not_cached() {
    let cache = memory_cache().await;
    // Port 9 (discard) is not listening on loopback
    let client = LrclibClient::new(http_client(), "http://127.0.0.1:9", cache.clone());

    let pending = PendingOps::new();
    assert!(client
        .get_lyrics(&RequestContext::new(pending.clone()), &query("offline"))
        .await
        .is_none());
    pending.drain().await;

    assert!(!cache.get_negative("lrclib", "offline").await.unwrap().hit);
}
