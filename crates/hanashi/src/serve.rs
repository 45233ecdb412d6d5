// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `hanashi serve` command implementation.
//!
//! Opens the SQLite store, builds the broadcast registry, and serves the
//! REST API and SSE streams until a shutdown signal arrives. Shutdown
//! checkpoints the WAL by closing the store.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hanashi_broadcast::BroadcastRegistry;
use hanashi_config::model::HanashiConfig;
use hanashi_core::HanashiError;
use hanashi_gateway::{start_server, AppState, AuthConfig, BindConfig};
use hanashi_storage::{ChatStore, Database};

/// Runs the `hanashi serve` command.
///
/// Serves until SIGINT or SIGTERM, then closes the store so the WAL is
/// checkpointed before exit.
pub async fn run_serve(config: HanashiConfig) -> Result<(), HanashiError> {
    init_tracing(&config.log.level);

    info!("starting hanashi serve");

    if config.server.tokens.is_empty() {
        warn!("no bearer tokens configured; every authenticated request will be rejected");
    }

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    let store = Arc::new(ChatStore::new(db));
    info!(
        path = %config.storage.database_path,
        wal = config.storage.wal_mode,
        "store opened"
    );

    let registry = Arc::new(BroadcastRegistry::new());

    let state = AppState::new(
        store.clone(),
        registry,
        AuthConfig::new(config.server.tokens.clone()),
        i64::from(config.chat.page_size),
        config.chat.broadcast_buffer,
    );
    let bind = BindConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };

    let cancel = install_signal_handler();

    tokio::select! {
        result = start_server(&bind, state) => result?,
        _ = cancel.cancelled() => {
            info!("shutdown signal received, stopping gateway");
        }
    }

    store.close().await?;
    info!("hanashi serve shutdown complete");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal
/// is received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler; Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hanashi={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_handler_returns_an_uncancelled_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn serve_components_wire_up_from_config() {
        // The same assembly run_serve performs, minus bind and signals.
        let dir = tempfile::tempdir().unwrap();
        let mut config = HanashiConfig::default();
        config.storage.database_path = dir
            .path()
            .join("serve.db")
            .to_string_lossy()
            .into_owned();
        config
            .server
            .tokens
            .insert("tok-alice".to_string(), "alice".to_string());

        let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode)
            .await
            .unwrap();
        let store = Arc::new(ChatStore::new(db));
        let state = AppState::new(
            store.clone(),
            Arc::new(BroadcastRegistry::new()),
            AuthConfig::new(config.server.tokens.clone()),
            i64::from(config.chat.page_size),
            config.chat.broadcast_buffer,
        );

        let _router = hanashi_gateway::build_router(state);
        store.close().await.unwrap();
    }
}
