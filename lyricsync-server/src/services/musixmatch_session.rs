//! Process-wide musixmatch session: user token and cookie jar
//!
//! Built once per process and shared by every request. State lives behind
//! short `std::sync::Mutex` sections that are never held across an await.
//!
//! Token states:
//! - `Unset` to `Acquiring` on first need
//! - `Acquiring` to `Valid` on a successful token response
//! - `Acquiring` to `Invalid` after [`MAX_TOKEN_ATTEMPTS`] failures; terminal
//!   until [`MusixmatchSession::reset`]
//! - `Valid` to `Unset` when any authenticated call is rejected
//!
//! Acquisition is not serialized. Two requests that both find the state
//! `Unset` both fetch a token; the last successful writer wins. A late
//! success never revives an `Invalid` session.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Token requests before the session is disabled
pub const MAX_TOKEN_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unset,
    Acquiring,
    Valid(String),
    Invalid,
}

/// What a caller needing a token should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheckout {
    /// Use this token
    Ready(String),
    /// Request a token from upstream
    Acquire,
    /// Session disabled; skip the upstream call
    Disabled,
}

pub struct MusixmatchSession {
    state: Mutex<TokenState>,
    cookies: Mutex<BTreeMap<String, String>>,
    max_attempts: u32,
}

impl Default for MusixmatchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MusixmatchSession {
    pub fn new() -> Self {
        Self::with_max_attempts(MAX_TOKEN_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(TokenState::Unset),
            cookies: Mutex::new(BTreeMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    // Lock poisoning is ignored
    fn state_guard(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cookie_guard(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> TokenState {
        self.state_guard().clone()
    }

    /// Current token, if valid
    pub fn token(&self) -> Option<String> {
        match &*self.state_guard() {
            TokenState::Valid(token) => Some(token.clone()),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        *self.state_guard() == TokenState::Invalid
    }

    /// Decide how to obtain a token, entering `Acquiring` when needed
    pub fn checkout(&self) -> TokenCheckout {
        let mut state = self.state_guard();
        match &*state {
            TokenState::Valid(token) => TokenCheckout::Ready(token.clone()),
            TokenState::Invalid => TokenCheckout::Disabled,
            TokenState::Unset | TokenState::Acquiring => {
                *state = TokenState::Acquiring;
                TokenCheckout::Acquire
            }
        }
    }

    /// Record a successful acquisition; returns the token now in effect
    pub fn complete(&self, token: String) -> Option<String> {
        let mut state = self.state_guard();
        match &*state {
            TokenState::Invalid => {
                debug!("Discarding late token for disabled session");
                None
            }
            _ => {
                *state = TokenState::Valid(token.clone());
                info!("Musixmatch session token acquired");
                Some(token)
            }
        }
    }

    /// Record attempt exhaustion; a token won concurrently is kept
    pub fn fail(&self) {
        let mut state = self.state_guard();
        if !matches!(*state, TokenState::Valid(_)) {
            warn!(attempts = self.max_attempts, "Musixmatch token unavailable, disabling provider");
            *state = TokenState::Invalid;
        }
    }

    /// Drop a rejected token so the next caller re-acquires
    pub fn invalidate(&self) {
        let mut state = self.state_guard();
        if matches!(*state, TokenState::Valid(_)) {
            debug!("Musixmatch token rejected, resetting");
            *state = TokenState::Unset;
        }
    }

    /// Forget everything, including a disabled state
    pub fn reset(&self) {
        *self.state_guard() = TokenState::Unset;
        self.cookie_guard().clear();
    }

    /// Absorb `Set-Cookie` headers into the jar
    ///
    /// A cookie already expired by `Max-Age` or `Expires` is removed.
    pub fn store_cookies(&self, headers: &HeaderMap) {
        let mut jar = self.cookie_guard();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let mut parts = value.split(';');
            let pair = parts.next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            if parts.any(is_expiry) {
                debug!(cookie = name, "Removing expired cookie");
                jar.remove(name);
            } else {
                jar.insert(name.to_string(), value.trim().to_string());
            }
        }
    }

    /// `Cookie` header value replaying the jar
    pub fn cookie_header(&self) -> Option<String> {
        let jar = self.cookie_guard();
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// True for a `Max-Age` or `Expires` attribute already in the past
fn is_expiry(attribute: &str) -> bool {
    let Some((key, value)) = attribute.split_once('=') else {
        return false;
    };
    let value = value.trim();
    match key.trim().to_ascii_lowercase().as_str() {
        "max-age" => value.parse::<i64>().is_ok_and(|secs| secs <= 0),
        "expires" => DateTime::parse_from_rfc2822(value).is_ok_and(|at| at <= Utc::now()),
        _ => false,
    }
}
