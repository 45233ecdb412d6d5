// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Hanashi chat stack.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Hanashi configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HanashiConfig {
    /// HTTP server bind address and token table.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat paging and windowing settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Terminal client settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Static bearer-token table mapping token -> user id.
    ///
    /// Authentication is delegated to this table; an empty table means
    /// every authenticated route rejects with 401.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tokens: HashMap::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8750
}

/// Storage backend configuration.
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
        .map(|p| p.join("hanashi").join("hanashi.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("hanashi.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Chat paging and windowing configuration.
///
/// `page_size` drives history pages on both server default and client
/// fetches; `max_window` bounds the client's in-memory message window.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Number of messages per history page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum messages held in a client window before eviction.
    #[serde(default = "default_max_window")]
    pub max_window: usize,

    /// Per-subscriber broadcast channel capacity.
    #[serde(default = "default_broadcast_buffer")]
    pub broadcast_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_window: default_max_window(),
            broadcast_buffer: default_broadcast_buffer(),
        }
    }
}

fn default_page_size() -> u32 {
    30
}

fn default_max_window() -> usize {
    100
}

fn default_broadcast_buffer() -> usize {
    64
}

/// Terminal client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the Hanashi server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Bearer token presented on every request. `None` requires the
    /// `--user-token` CLI flag.
    #[serde(default)]
    pub token: Option<String>,

    /// Initial reconnect backoff in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for reconnect backoff in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: None,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:8750".to_string()
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
