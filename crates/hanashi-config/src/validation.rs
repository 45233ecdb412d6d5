// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, paging bounds, and backoff
//! ordering.

use crate::diagnostic::ConfigError;
use crate::model::HanashiConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &HanashiConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate host is not empty
    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    } else {
        // Accept valid IPv4, IPv6, or hostname patterns
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("server.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if config.server.port == 0 {
        errors.push(ConfigError::Validation {
            message: "server.port must be non-zero".to_string(),
        });
    }

    // Token table entries must carry a user id
    for (token, user_id) in &config.server.tokens {
        if token.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "server.tokens contains an empty token".to_string(),
            });
        }
        if user_id.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("server.tokens entry for `{token}` has an empty user id"),
            });
        }
    }

    // Validate database_path is not empty
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Paging bounds: the server clamps limits to [1, 100], so a page size
    // outside that range would silently differ from what was configured.
    if config.chat.page_size == 0 || config.chat.page_size > 100 {
        errors.push(ConfigError::Validation {
            message: format!(
                "chat.page_size must be in 1..=100, got {}",
                config.chat.page_size
            ),
        });
    }

    // A window smaller than one page would evict messages from the page
    // that just loaded them.
    if config.chat.max_window < config.chat.page_size as usize {
        errors.push(ConfigError::Validation {
            message: format!(
                "chat.max_window ({}) must be at least chat.page_size ({})",
                config.chat.max_window, config.chat.page_size
            ),
        });
    }

    if config.chat.broadcast_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "chat.broadcast_buffer must be at least 1".to_string(),
        });
    }

    // Client URL must be an http(s) base
    let url = config.client.server_url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        errors.push(ConfigError::Validation {
            message: format!("client.server_url `{url}` must start with http:// or https://"),
        });
    }

    if config.client.backoff_base_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "client.backoff_base_ms must be at least 1".to_string(),
        });
    }

    if config.client.backoff_cap_ms < config.client.backoff_base_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "client.backoff_cap_ms ({}) must be >= client.backoff_base_ms ({})",
                config.client.backoff_cap_ms, config.client.backoff_base_ms
            ),
        });
    }

    if !LOG_LEVELS.contains(&config.log.level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.log.level
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
