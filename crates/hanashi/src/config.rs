// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `hanashi config` command implementation.
//!
//! Prints the effective configuration after all layers (defaults, files,
//! environment) have been merged, with secrets redacted.

use hanashi_config::model::HanashiConfig;
use hanashi_core::HanashiError;

/// Runs the `hanashi config` command.
pub fn run_config(config: &HanashiConfig) -> Result<(), HanashiError> {
    print!("{}", render_config(config)?);
    Ok(())
}

/// The effective config as TOML with secrets removed.
///
/// Server tokens are secrets in the key position, so the whole table is
/// collapsed to a count; the client token value is masked.
fn render_config(config: &HanashiConfig) -> Result<String, HanashiError> {
    let mut value = toml::Value::try_from(config)
        .map_err(|e| HanashiError::Internal(format!("failed to serialize config: {e}")))?;
    redact(&mut value);
    toml::to_string_pretty(&value)
        .map_err(|e| HanashiError::Internal(format!("failed to render config: {e}")))
}

fn redact(value: &mut toml::Value) {
    if let Some(server) = value.get_mut("server").and_then(|v| v.as_table_mut()) {
        if let Some(tokens) = server.get_mut("tokens") {
            let count = tokens.as_table().map_or(0, |t| t.len());
            *tokens = toml::Value::String(format!("{count} token(s) configured (redacted)"));
        }
    }
    if let Some(client) = value.get_mut("client").and_then(|v| v.as_table_mut()) {
        if let Some(token) = client.get_mut("token") {
            *token = toml::Value::String("[redacted]".to_string());
        }
    }
}
