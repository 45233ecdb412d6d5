// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./hanashi.toml` > `~/.config/hanashi/hanashi.toml`
//! > `/etc/hanashi/hanashi.toml` with environment variable overrides via
//! `HANASHI_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use tracing::debug;

use crate::model::HanashiConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/hanashi/hanashi.toml` (system-wide)
/// 3. `~/.config/hanashi/hanashi.toml` (user XDG config)
/// 4. `./hanashi.toml` (local directory)
/// 5. `HANASHI_*` environment variables
pub fn load_config() -> Result<HanashiConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a specific TOML string only (no XDG lookup).
///
/// Used for testing and for callers that carry their own TOML.
pub fn load_config_from_str(toml_content: &str) -> Result<HanashiConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HanashiConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HanashiConfig, figment::Error> {
    debug!(path = %path.display(), "loading config file");
    Figment::new()
        .merge(Serialized::defaults(HanashiConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(HanashiConfig::default()))
        .merge(Toml::file("/etc/hanashi/hanashi.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("hanashi/hanashi.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("hanashi.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `HANASHI_STORAGE_DATABASE_PATH` must map
/// to `storage.database_path`, not `storage.database.path`. Only the first
/// segment is treated as a section name, so `HANASHI_CLIENT_SERVER_URL`
/// maps to `client.server_url` even though `server` is itself a section.
fn env_provider() -> Env {
    Env::prefixed("HANASHI_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        let key_str = key.as_str();
        let mapped = match key_str.split_once('_') {
            Some((section @ ("server" | "storage" | "chat" | "client" | "log"), rest)) => {
                format!("{section}.{rest}")
            }
            _ => key_str.to_string(),
        };
        mapped.into()
    })
}
