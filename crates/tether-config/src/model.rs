// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tether networking client.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tether configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Client identity and logging.
    #[serde(default)]
    pub client: ClientConfig,

    /// Durable store settings for the offline queue.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Offline queue drain behavior.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Real-time connection settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Presence broadcasting settings.
    #[serde(default)]
    pub presence: PresenceConfig,
}

/// Client identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Display name used in logs.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_client_name() -> String {
    "tether".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    "tether.db".to_string()
}

fn default_true() -> bool {
    true
}

/// Offline queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Attempts allowed per request when the caller does not specify one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Period of the background drain scan.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,

    /// Pause between consecutive requests within one drain pass.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            drain_interval_secs: default_drain_interval_secs(),
            request_delay_ms: default_request_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl QueueConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_drain_interval_secs() -> u64 {
    30
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Real-time connection configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Server endpoint. An `http`/`https` scheme is rewritten to `ws`/`wss`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token appended as the `token` query parameter.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Base interval for exponential reconnect backoff.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Reconnects attempted after an unexpected close before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Period of outbound heartbeat frames while connected.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Messages buffered while disconnected; the oldest is dropped beyond this.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            auth_token: None,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

impl TransportConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .field("reconnect_interval_ms", &self.reconnect_interval_ms)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("outbound_capacity", &self.outbound_capacity)
            .finish()
    }
}

fn default_endpoint() -> String {
    "http://localhost:8080/ws".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_outbound_capacity() -> usize {
    100
}

/// Presence broadcasting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Period of the local self-publish loop.
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,

    /// Records older than this are excluded from the online view.
    #[serde(default = "default_online_window_secs")]
    pub online_window_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            publish_interval_secs: default_publish_interval_secs(),
            online_window_secs: default_online_window_secs(),
        }
    }
}

impl PresenceConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn online_window_millis(&self) -> i64 {
        i64::try_from(self.online_window_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

fn default_publish_interval_secs() -> u64 {
    30
}

fn default_online_window_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_debug_redacts_token() {
        let config = TransportConfig {
            auth_token: Some("super-secret".into()),
            ..TransportConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn duration_helpers() {
        let queue = QueueConfig::default();
        assert_eq!(queue.drain_interval(), Duration::from_secs(30));
        assert_eq!(queue.request_delay(), Duration::from_millis(100));
        assert_eq!(PresenceConfig::default().online_window_millis(), 60_000);
        assert_eq!(
            TransportConfig::default().reconnect_interval(),
            Duration::from_secs(1)
        );
    }
}
