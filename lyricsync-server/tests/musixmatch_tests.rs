//! musixmatch client against a mock upstream
//!
//! - Token acquisition, cookie replay and manual redirects
//! - Word-level lyrics aligned against subtitles or a concurrent line source
//! - Session invalidation on 401 and terminal token exhaustion

mod helpers;

use axum::extract::{Path, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::FutureExt;
use helpers::{manual_redirect_client, memory_cache, query, spawn_upstream, CallLog};
use lyricsync_server::cache::LyricsCache;
use lyricsync_server::models::{LyricFormat, LyricsResult};
use lyricsync_server::pending::PendingOps;
use lyricsync_server::services::{
    LineSource, MusixmatchClient, MusixmatchSession, RequestContext, TokenState,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "tok-123";

const SUBTITLE: &str = "[00:18.50]We're no strangers to love\n[00:22.80]You know the rules";

fn richsync_body() -> String {
    json!([
        {
            "ts": 18.5, "te": 22.0,
            "l": [
                {"c": "We're", "o": 0}, {"c": " ", "o": 0.25}, {"c": "no", "o": 0.5},
                {"c": " ", "o": 0.75}, {"c": "strangers", "o": 1.0}, {"c": " ", "o": 1.5},
                {"c": "to", "o": 1.75}, {"c": " ", "o": 2.0}, {"c": "love", "o": 2.25}
            ],
            "x": "We're no strangers to love"
        },
        {
            "ts": 22.8, "te": 25.0,
            "l": [
                {"c": "You", "o": 0}, {"c": " ", "o": 0.25}, {"c": "know", "o": 0.5},
                {"c": " ", "o": 0.75}, {"c": "the", "o": 1.0}, {"c": " ", "o": 1.25},
                {"c": "rules", "o": 1.5}
            ],
            "x": "You know the rules"
        }
    ])
    .to_string()
}

/// Envelope answered by every musixmatch endpoint
fn envelope(status_code: u16, body: Value) -> Response {
    Json(json!({"message": {"header": {"status_code": status_code}, "body": body}})).into_response()
}

/// Mock behavior knobs
#[derive(Clone)]
struct Script {
    token: &'static str,
    token_http_status: StatusCode,
    /// `token.get` answers 503 this many times before succeeding
    token_failures: usize,
    /// `token.get` first answers a redirect setting a cookie
    redirect_token: bool,
    /// `token.get` redirects to itself forever
    redirect_loop: bool,
    matcher_status: u16,
    /// First `matcher.track.get` is rejected with envelope 401
    reject_first_match: bool,
    has_richsync: bool,
    has_subtitles: bool,
    richsync_status: u16,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            token: TOKEN,
            token_http_status: StatusCode::OK,
            token_failures: 0,
            redirect_token: false,
            redirect_loop: false,
            matcher_status: 200,
            reject_first_match: false,
            has_richsync: true,
            has_subtitles: true,
            richsync_status: 200,
        }
    }
}

async fn handle(
    log: CallLog,
    script: Script,
    method: String,
    redirected: bool,
    params: HashMap<String, String>,
    headers: HeaderMap,
) -> Response {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let previous_matches = log.count("matcher.track.get");
    let previous_tokens = log.count("token.get");
    log.record(format!(
        "{} cookie={} usertoken={}",
        method,
        cookie,
        params.get("usertoken").cloned().unwrap_or_default()
    ));

    match method.as_str() {
        "token.get" => {
            if script.redirect_loop {
                return (StatusCode::FOUND, [(header::LOCATION, "/token.get")]).into_response();
            }
            if script.redirect_token && !redirected {
                return (
                    StatusCode::FOUND,
                    [
                        (header::LOCATION, "/redirected/token.get?app_id=test"),
                        (header::SET_COOKIE, "hop=1; Path=/"),
                    ],
                )
                    .into_response();
            }
            if previous_tokens < script.token_failures {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            if script.token_http_status != StatusCode::OK {
                return script.token_http_status.into_response();
            }
            let mut response = envelope(200, json!({"user_token": script.token}));
            response.headers_mut().insert(
                header::SET_COOKIE,
                "session=abc; Path=/; HttpOnly".parse().unwrap(),
            );
            response
        }
        "matcher.track.get" => {
            if script.reject_first_match && previous_matches == 0 {
                return envelope(401, json!([]));
            }
            if script.matcher_status != 200 {
                return envelope(script.matcher_status, json!([]));
            }
            envelope(
                200,
                json!({"track": {
                    "track_id": 1001,
                    "commontrack_id": 2002,
                    "has_richsync": if script.has_richsync { 1 } else { 0 },
                    "has_subtitles": if script.has_subtitles { 1 } else { 0 },
                    "instrumental": 0,
                }}),
            )
        }
        "track.richsync.get" => {
            if script.richsync_status != 200 {
                return envelope(script.richsync_status, json!([]));
            }
            envelope(200, json!({"richsync": {"richsync_body": richsync_body()}}))
        }
        "track.subtitle.get" => envelope(200, json!({"subtitle": {"subtitle_body": SUBTITLE}})),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn musixmatch_router(log: CallLog, script: Script) -> Router {
    let direct_log = log.clone();
    let direct_script = script.clone();
    Router::new()
        .route(
            "/:method",
            get(
                move |Path(method): Path<String>,
                      Query(params): Query<HashMap<String, String>>,
                      headers: HeaderMap| {
                    handle(direct_log.clone(), direct_script.clone(), method, false, params, headers)
                },
            ),
        )
        .route(
            "/redirected/:method",
            get(
                move |Path(method): Path<String>,
                      Query(params): Query<HashMap<String, String>>,
                      headers: HeaderMap| {
                    handle(log.clone(), script.clone(), method, true, params, headers)
                },
            ),
        )
}

async fn client_for(
    script: Script,
    max_attempts: u32,
) -> (MusixmatchClient, CallLog, Arc<LyricsCache>) {
    let log = CallLog::default();
    let base = spawn_upstream(musixmatch_router(log.clone(), script)).await;
    let cache = memory_cache().await;
    let client = MusixmatchClient::new(
        manual_redirect_client(),
        &base,
        "test-app",
        Arc::new(MusixmatchSession::with_max_attempts(max_attempts)),
        cache.clone(),
        Duration::from_millis(500),
    );
    (client, log, cache)
}

async fn lookup(client: &MusixmatchClient, ctx: RequestContext, id: &str) -> Option<LyricsResult> {
    let pending = ctx.pending.clone();
    let result = client.get_lyrics(&ctx, &query(id)).await;
    pending.drain().await;
    result
}

#[tokio::test]
async fn test_richsync_aligned_against_subtitle() {
    let (client, log, cache) = client_for(Script::default(), 3).await;

    let result = lookup(&client, RequestContext::default(), "vid").await.expect("lyrics");

    let word_synced = result.word_synced.as_deref().expect("word-level lyrics");
    assert!(
        word_synced.starts_with("[offset:+0]\n[00:18.50]<00:18.50>We're"),
        "unexpected word-level output: {}",
        word_synced
    );
    assert_eq!(result.line_synced.as_deref(), Some(SUBTITLE));
    assert_eq!(
        result.plain.as_deref(),
        Some("We're no strangers to love\nYou know the rules")
    );
    assert_eq!(result.debug.as_ref().unwrap()["alignment"], "accepted");

    // Token acquired once, its cookie and token replayed afterwards
    assert_eq!(log.count("token.get"), 1);
    let matcher = log
        .entries()
        .into_iter()
        .find(|entry| entry.starts_with("matcher.track.get"))
        .unwrap();
    assert_eq!(matcher, format!("matcher.track.get cookie=session=abc usertoken={}", TOKEN));
    assert_eq!(client.session().state(), TokenState::Valid(TOKEN.to_string()));

    let cached = cache
        .get_positive(&PendingOps::new(), "musixmatch", "vid")
        .await
        .unwrap()
        .expect("cached");
    assert!(cached.contents.contains_key(&LyricFormat::Richsync));
    assert!(cached.contents.contains_key(&LyricFormat::Synced));
}

#[tokio::test]
async fn test_concurrent_line_source_is_preferred() {
    let (client, log, _cache) = client_for(Script::default(), 3).await;

    // Line-level transcript timed one second earlier than the word-level one
    let line_source: LineSource = async {
        Some(LyricsResult {
            line_synced: Some(
                "[00:17.50]We're no strangers to love\n[00:21.80]You know the rules".to_string(),
            ),
            ..Default::default()
        })
    }
    .boxed()
    .shared();
    let ctx = RequestContext::new(PendingOps::new()).with_line_source(line_source);

    let result = lookup(&client, ctx, "vid").await.expect("lyrics");

    assert!(result.word_synced.unwrap().starts_with("[offset:+1000]\n"));
    assert_eq!(log.count("track.subtitle.get"), 0, "subtitle not needed");
}

#[tokio::test]
async fn test_richsync_not_found_falls_back_to_subtitles() {
    let script = Script {
        richsync_status: 404,
        ..Default::default()
    };
    let (client, _log, cache) = client_for(script, 3).await;

    let result = lookup(&client, RequestContext::default(), "vid").await.expect("lyrics");

    assert!(result.word_synced.is_none());
    assert_eq!(result.line_synced.as_deref(), Some(SUBTITLE));
    assert!(!cache.get_negative("musixmatch", "vid").await.unwrap().hit);
}

#[tokio::test]
async fn test_subtitles_only_track_yields_line_level() {
    let script = Script {
        has_richsync: false,
        ..Default::default()
    };
    let (client, log, cache) = client_for(script, 3).await;

    let result = lookup(&client, RequestContext::default(), "vid").await.expect("lyrics");

    assert!(result.word_synced.is_none());
    assert_eq!(result.line_synced.as_deref(), Some(SUBTITLE));
    assert_eq!(
        result.plain.as_deref(),
        Some("We're no strangers to love\nYou know the rules")
    );
    assert_eq!(log.count("track.richsync.get"), 0);

    let cached = cache
        .get_positive(&PendingOps::new(), "musixmatch", "vid")
        .await
        .unwrap()
        .expect("cached");
    assert!(cached.contents.contains_key(&LyricFormat::Synced));
    assert!(!cached.contents.contains_key(&LyricFormat::Richsync));
}

#[tokio::test]
async fn test_track_without_synced_lyrics_is_negative_cached() {
    let script = Script {
        has_richsync: false,
        has_subtitles: false,
        ..Default::default()
    };
    let (client, log, cache) = client_for(script, 3).await;

    assert!(lookup(&client, RequestContext::default(), "vid").await.is_none());
    assert_eq!(log.count("track.richsync.get"), 0);
    assert_eq!(log.count("track.subtitle.get"), 0);

    let negative = cache.get_negative("musixmatch", "vid").await.unwrap();
    assert!(negative.hit);
    assert!(!negative.stale);

    // Confirmed absence suppresses the next lookup
    let calls = log.entries().len();
    assert!(lookup(&client, RequestContext::default(), "vid").await.is_none());
    assert_eq!(log.entries().len(), calls);
}

#[tokio::test]
async fn test_unmatched_track_is_negative_cached() {
    let script = Script {
        matcher_status: 404,
        ..Default::default()
    };
    let (client, _log, cache) = client_for(script, 3).await;

    assert!(lookup(&client, RequestContext::default(), "vid").await.is_none());
    assert!(cache.get_negative("musixmatch", "vid").await.unwrap().hit);
}

#[tokio::test]
async fn test_redirect_cookies_reach_the_jar() {
    let script = Script {
        redirect_token: true,
        ..Default::default()
    };
    let (client, log, _cache) = client_for(script, 3).await;

    assert_eq!(client.ensure_token().await.as_deref(), Some(TOKEN));
    assert_eq!(log.count("token.get"), 2, "original hop plus redirect target");
    assert_eq!(
        client.session().cookie_header().as_deref(),
        Some("hop=1; session=abc")
    );

    // The intermediate hop's cookie is replayed on the redirect target
    let hops = log.entries();
    assert_eq!(hops[1], "token.get cookie=hop=1 usertoken=");
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let script = Script {
        redirect_loop: true,
        ..Default::default()
    };
    let (client, log, _cache) = client_for(script, 1).await;

    assert!(client.ensure_token().await.is_none());
    // Initial request plus five followed hops
    assert_eq!(log.count("token.get"), 6);
    assert_eq!(client.session().state(), TokenState::Invalid);
}

#[tokio::test]
async fn test_unauthorized_invalidates_session() {
    let script = Script {
        reject_first_match: true,
        ..Default::default()
    };
    let (client, log, cache) = client_for(script, 3).await;

    assert!(lookup(&client, RequestContext::default(), "vid").await.is_none());
    assert_eq!(client.session().state(), TokenState::Unset);
    assert!(
        !cache.get_negative("musixmatch", "vid").await.unwrap().hit,
        "rejection is not an absence"
    );

    // Next lookup re-acquires a token and succeeds
    let result = lookup(&client, RequestContext::default(), "vid").await;
    assert!(result.is_some());
    assert_eq!(log.count("token.get"), 2);
}

#[tokio::test]
async fn test_token_exhaustion_is_terminal() {
    let script = Script {
        token_http_status: StatusCode::SERVICE_UNAVAILABLE,
        ..Default::default()
    };
    let (client, log, cache) = client_for(script, 3).await;

    let started = std::time::Instant::now();
    assert!(lookup(&client, RequestContext::default(), "vid").await.is_none());
    assert_eq!(log.count("token.get"), 3);
    assert!(client.session().is_disabled());
    // Backoff of 50ms then 100ms between the three attempts
    assert!(started.elapsed() >= Duration::from_millis(150));

    // Disabled: no further upstream traffic
    assert!(lookup(&client, RequestContext::default(), "other").await.is_none());
    assert_eq!(log.entries().len(), 3);
    assert!(!cache.get_negative("musixmatch", "vid").await.unwrap().hit);
}

#[tokio::test]
async fn test_upgrade_only_token_is_rejected() {
    let script = Script {
        token: "UpgradeOnlyUpgradeOnly",
        ..Default::default()
    };
    let (client, log, _cache) = client_for(script, 2).await;

    assert!(client.ensure_token().await.is_none());
    assert_eq!(log.count("token.get"), 2);
    assert_eq!(client.session().state(), TokenState::Invalid);
}

#[tokio::test]
async fn test_transient_token_failure_recovers_after_backoff() {
    let script = Script {
        token_failures: 1,
        ..Default::default()
    };
    let (client, log, _cache) = client_for(script, 3).await;

    let started = std::time::Instant::now();
    assert_eq!(client.ensure_token().await.as_deref(), Some(TOKEN));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(log.count("token.get"), 2);
    assert_eq!(client.session().state(), TokenState::Valid(TOKEN.to_string()));
}
