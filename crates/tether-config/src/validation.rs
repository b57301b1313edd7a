// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as endpoint schemes, non-empty paths, and non-zero intervals.

use crate::diagnostic::ConfigError;
use crate::model::TetherConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const ENDPOINT_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TetherConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.client.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "client.log_level `{}` must be one of: {}",
                config.client.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    match url::Url::parse(&config.transport.endpoint) {
        Ok(url) if ENDPOINT_SCHEMES.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ConfigError::Validation {
            message: format!(
                "transport.endpoint scheme `{}` is not supported, use http, https, ws or wss",
                url.scheme()
            ),
        }),
        Err(e) => errors.push(ConfigError::Validation {
            message: format!(
                "transport.endpoint `{}` is not a valid URL: {e}",
                config.transport.endpoint
            ),
        }),
    }

    let positive: [(&str, u64); 6] = [
        ("queue.drain_interval_secs", config.queue.drain_interval_secs),
        (
            "transport.reconnect_interval_ms",
            config.transport.reconnect_interval_ms,
        ),
        (
            "transport.heartbeat_interval_secs",
            config.transport.heartbeat_interval_secs,
        ),
        (
            "transport.outbound_capacity",
            config.transport.outbound_capacity as u64,
        ),
        (
            "presence.publish_interval_secs",
            config.presence.publish_interval_secs,
        ),
        (
            "presence.online_window_secs",
            config.presence.online_window_secs,
        ),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be greater than zero"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &TetherConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&TetherConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TetherConfig::default();
        config.storage.database_path = "  ".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("database_path")));
    }

    #[test]
    fn unsupported_endpoint_scheme_fails() {
        let mut config = TetherConfig::default();
        config.transport.endpoint = "ftp://example.com/ws".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("scheme `ftp`")));
    }

    #[test]
    fn unparseable_endpoint_fails() {
        let mut config = TetherConfig::default();
        config.transport.endpoint = "not a url".to_string();
        assert!(messages(&config)
            .iter()
            .any(|m| m.contains("is not a valid URL")));
    }

    #[test]
    fn zero_intervals_are_all_reported() {
        let mut config = TetherConfig::default();
        config.transport.reconnect_interval_ms = 0;
        config.transport.outbound_capacity = 0;
        config.presence.online_window_secs = 0;
        let errors = messages(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|m| m.contains("reconnect_interval_ms")));
        assert!(errors.iter().any(|m| m.contains("outbound_capacity")));
        assert!(errors.iter().any(|m| m.contains("online_window_secs")));
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = TetherConfig::default();
        config.client.log_level = "loud".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("log_level")));
    }

    #[test]
    fn secure_websocket_endpoint_passes() {
        let mut config = TetherConfig::default();
        config.transport.endpoint = "wss://rt.example.com/socket".to_string();
        config.queue.max_retries = 0;
        assert!(validate_config(&config).is_ok());
    }
}
