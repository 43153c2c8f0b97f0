// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./kobeai.toml` > `~/.config/kobeai/kobeai.toml` > `/etc/kobeai/kobeai.toml`
//! with environment variable overrides via `KOBEAI_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ClientConfig;

/// Config sections that environment variables may address.
const SECTIONS: &[&str] = &[
    "client",
    "server",
    "auth",
    "stream",
    "retry",
    "connectivity",
    "storage",
];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/kobeai/kobeai.toml";
pub(crate) const LOCAL_CONFIG: &str = "kobeai.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("kobeai/kobeai.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/kobeai/kobeai.toml` (system-wide)
/// 3. `~/.config/kobeai/kobeai.toml` (user XDG config)
/// 4. `./kobeai.toml` (local directory)
/// 5. `KOBEAI_*` environment variables
pub fn load_config() -> Result<ClientConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
pub fn load_config_from_str(toml_content: &str) -> Result<ClientConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ClientConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ClientConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading without extracting it.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ClientConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider mapping `KOBEAI_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the leading section name is split off, so keys containing underscores
/// (`KOBEAI_STREAM_STALL_TIMEOUT_MS`) keep them.
fn env_provider() -> Env {
    Env::prefixed("KOBEAI_").map(|key| map_env_key(key.as_str()).into())
}

/// Figment hands keys over as written in the environment, upper case included.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_only_the_section() {
        assert_eq!(
            map_env_key("STREAM_STALL_TIMEOUT_MS"),
            "stream.stall_timeout_ms"
        );
        assert_eq!(map_env_key("SERVER_BASE_URL"), "server.base_url");
        assert_eq!(map_env_key("retry_max_attempts"), "retry.max_attempts");
        assert_eq!(map_env_key("UNRELATED"), "unrelated");
    }
}
