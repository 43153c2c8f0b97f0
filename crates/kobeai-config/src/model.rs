// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the KobeAI chat client.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level client configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Client identity and logging.
    #[serde(default)]
    pub client: ClientSection,

    /// Backend endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Credential lifetime settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Streaming reply timers and protocol markers.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Send retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Reachability probing.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Client identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    /// Display name used in the interactive shell.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_client_name() -> String {
    "KobeAI".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for non-streaming JSON requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Value of the `platformType` query parameter on the send endpoint.
    /// `None` omits the parameter.
    #[serde(default = "default_platform_type")]
    pub platform_type: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            platform_type: default_platform_type(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_platform_type() -> Option<String> {
    Some("DEEPSEEK".to_string())
}

/// Credential lifetime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// A credential expiring within this window is refreshed before use.
    #[serde(default = "default_refresh_lookahead_secs")]
    pub refresh_lookahead_secs: u64,

    /// Lifetime assumed for tokens the server issues without an expiry.
    #[serde(default = "default_token_ttl_secs")]
    pub default_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_lookahead_secs: default_refresh_lookahead_secs(),
            default_token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl AuthConfig {
    pub fn refresh_lookahead(&self) -> Duration {
        Duration::from_secs(self.refresh_lookahead_secs)
    }

    pub fn default_token_ttl(&self) -> Duration {
        Duration::from_secs(self.default_token_ttl_secs)
    }
}

fn default_refresh_lookahead_secs() -> u64 {
    30 * 60
}

fn default_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Streaming reply configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Time allowed for the response head to arrive.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Hard ceiling on a whole streaming read.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Byte silence after which a liveness-only stream is declared stalled.
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Liveness frames required before a silent stream counts as stalled.
    #[serde(default = "default_stall_liveness_threshold")]
    pub stall_liveness_threshold: u32,

    /// Time a stream may deliver only liveness frames before it is abandoned.
    #[serde(default = "default_keepalive_only_timeout_ms")]
    pub keepalive_only_timeout_ms: u64,

    /// Period of the timer evaluation tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Substrings marking a frame as a keep-alive.
    #[serde(default = "default_keepalive_markers")]
    pub keepalive_markers: Vec<String>,

    /// Text the server sends when the stream is established.
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_secs: default_read_timeout_secs(),
            stall_timeout_ms: default_stall_timeout_ms(),
            stall_liveness_threshold: default_stall_liveness_threshold(),
            keepalive_only_timeout_ms: default_keepalive_only_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            keepalive_markers: default_keepalive_markers(),
            placeholder_text: default_placeholder_text(),
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn keepalive_only_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_only_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_stall_timeout_ms() -> u64 {
    5_000
}

fn default_stall_liveness_threshold() -> u32 {
    3
}

fn default_keepalive_only_timeout_ms() -> u64 {
    15_000
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_keepalive_markers() -> Vec<String> {
    vec!["keep-alive".to_string()]
}

fn default_placeholder_text() -> String {
    "连接已建立".to_string()
}

/// Send retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per send, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after failed attempt `n` is `base_delay_ms * n`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

/// Reachability probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectivityConfig {
    /// Period of the background probe.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Path, relative to `server.base_url`, that the probe sends HEAD to.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Timeout for a single probe request.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_path: default_probe_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_probe_interval_secs() -> u64 {
    30
}

fn default_probe_path() -> String {
    "/user/profile".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("kobeai").join("client.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("kobeai.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}
