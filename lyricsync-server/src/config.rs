//! Service configuration
//!
//! Loaded from the bootstrap TOML file, then overridden from `LYRICSYNC_*`
//! environment variables. Command-line flags are applied last by `main`.
//!
//! ```toml
//! root_folder = "/var/lib/lyricsync"
//!
//! [logging]
//! level = "info"
//!
//! [server]
//! port = 5780
//!
//! [upstream]
//! lrclib_base_url = "https://lrclib.net"
//!
//! [cache.negative_ttl_secs]
//! musixmatch = 604800
//!
//! [orchestrator]
//! provider_timeout_ms = 10000
//! ```

use crate::cache::CacheSettings;
use crate::orchestrator::OrchestratorSettings;
use lyricsync_common::config::{env_override, load_toml_or_default, locate_config_file, LoggingConfig};
use lyricsync_common::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// HTTP listener and edge-cache settings (`[server]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    /// `Cache-Control` max-age when synced lyrics were found
    pub edge_ttl_found_secs: u64,
    /// `Cache-Control` max-age otherwise
    pub edge_ttl_empty_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5780,
            edge_ttl_found_secs: 7 * 24 * 3600,
            edge_ttl_empty_secs: 10 * 60,
        }
    }
}

/// Upstream endpoints (`[upstream]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub lrclib_base_url: String,
    pub ttml_base_url: String,
    pub musixmatch_base_url: String,
    pub musixmatch_app_id: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// How long musixmatch waits for the concurrent lrclib transcript
    pub line_source_wait_ms: u64,
    pub max_token_attempts: u32,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            lrclib_base_url: "https://lrclib.net".to_string(),
            ttml_base_url: "https://lyrics-api.binimum.org".to_string(),
            musixmatch_base_url: "https://apic-desktop.musixmatch.com/ws/1.1".to_string(),
            musixmatch_app_id: "web-desktop-app-v1.0".to_string(),
            request_timeout_secs: 10,
            line_source_wait_ms: 3_000,
            max_token_attempts: crate::services::musixmatch_session::MAX_TOKEN_ATTEMPTS,
        }
    }
}

impl UpstreamSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn line_source_wait(&self) -> Duration {
        Duration::from_millis(self.line_source_wait_ms)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Folder holding `lyricsync.db` and the blob directory
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub cache: CacheSettings,
    pub orchestrator: OrchestratorSettings,
}

impl ServiceConfig {
    /// Load TOML (explicit path, `LYRICSYNC_CONFIG`, platform default) and
    /// apply environment overrides
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = locate_config_file(config_path);
        let mut config: ServiceConfig = load_toml_or_default(path.as_deref())?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Environment overrides on top of TOML values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(level) = env_override::<String>("LYRICSYNC_LOG_LEVEL")? {
            self.logging.level = level;
        }
        if let Some(address) = env_override::<String>("LYRICSYNC_BIND_ADDRESS")? {
            self.server.bind_address = address;
        }
        if let Some(port) = env_override::<u16>("LYRICSYNC_PORT")? {
            self.server.port = port;
        }
        if let Some(url) = env_override::<String>("LYRICSYNC_LRCLIB_URL")? {
            self.upstream.lrclib_base_url = url;
        }
        if let Some(url) = env_override::<String>("LYRICSYNC_TTML_URL")? {
            self.upstream.ttml_base_url = url;
        }
        if let Some(url) = env_override::<String>("LYRICSYNC_MUSIXMATCH_URL")? {
            self.upstream.musixmatch_base_url = url;
        }
        if let Some(app_id) = env_override::<String>("LYRICSYNC_MUSIXMATCH_APP_ID")? {
            self.upstream.musixmatch_app_id = app_id;
        }
        Ok(())
    }

    /// Log the effective configuration at startup
    pub fn log_summary(&self, root_folder: &Path) {
        info!(
            root_folder = %root_folder.display(),
            bind = %format!("{}:{}", self.server.bind_address, self.server.port),
            lrclib = %self.upstream.lrclib_base_url,
            ttml = %self.upstream.ttml_base_url,
            musixmatch = %self.upstream.musixmatch_base_url,
            provider_timeout_ms = self.orchestrator.provider_timeout_ms,
            "Effective configuration"
        );
    }
}
