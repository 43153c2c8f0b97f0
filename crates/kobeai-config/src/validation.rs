// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ClientConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.client.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "client.log_level `{}` must be one of {}",
            config.client.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let base = config.server.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "server.base_url `{base}` must start with http:// or https://"
        )));
    }

    if config.server.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "server.request_timeout_secs must be greater than 0",
        ));
    }

    if config.auth.refresh_lookahead_secs >= config.auth.default_token_ttl_secs {
        errors.push(ConfigError::validation(format!(
            "auth.refresh_lookahead_secs ({}) must be smaller than auth.default_token_ttl_secs ({})",
            config.auth.refresh_lookahead_secs, config.auth.default_token_ttl_secs
        )));
    }

    let stream = &config.stream;
    for (name, value) in [
        ("stream.connect_timeout_ms", stream.connect_timeout_ms),
        ("stream.read_timeout_secs", stream.read_timeout_secs),
        ("stream.stall_timeout_ms", stream.stall_timeout_ms),
        ("stream.keepalive_only_timeout_ms", stream.keepalive_only_timeout_ms),
        ("stream.tick_interval_ms", stream.tick_interval_ms),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{name} must be greater than 0"
            )));
        }
    }

    if stream.tick_interval_ms > stream.stall_timeout_ms {
        errors.push(ConfigError::validation(format!(
            "stream.tick_interval_ms ({}) must not exceed stream.stall_timeout_ms ({})",
            stream.tick_interval_ms, stream.stall_timeout_ms
        )));
    }

    if stream.keepalive_markers.iter().any(|m| m.trim().is_empty()) {
        errors.push(ConfigError::validation(
            "stream.keepalive_markers must not contain empty entries",
        ));
    }

    if config.retry.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "retry.max_attempts must be at least 1",
        ));
    }

    if config.connectivity.probe_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "connectivity.probe_interval_secs must be greater than 0",
        ));
    }

    if !config.connectivity.probe_path.starts_with('/') {
        errors.push(ConfigError::validation(format!(
            "connectivity.probe_path `{}` must start with /",
            config.connectivity.probe_path
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
