// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the chat API.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use hanashi_broadcast::BroadcastRegistry;
use hanashi_core::HanashiError;
use hanashi_storage::ChatStore;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;
use crate::stream;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence facade; all domain rules live behind it.
    pub store: Arc<ChatStore>,
    /// Fan-out registry for live stream connections.
    pub registry: Arc<BroadcastRegistry>,
    /// Bearer-token table for the auth middleware.
    pub auth: AuthConfig,
    /// Process start, for the health endpoint's uptime.
    pub started_at: Instant,
    /// Page size used when a history request names no limit.
    pub default_page_size: i64,
    /// Per-connection event buffer; a client this far behind is dropped.
    pub stream_buffer: usize,
}

impl AppState {
    pub fn new(
        store: Arc<ChatStore>,
        registry: Arc<BroadcastRegistry>,
        auth: AuthConfig,
        default_page_size: i64,
        stream_buffer: usize,
    ) -> Self {
        Self {
            store,
            registry,
            auth,
            started_at: Instant::now(),
            default_page_size,
            stream_buffer,
        }
    }
}

/// Server bind configuration (mirrors ServerConfig from hanashi-config to
/// avoid a dependency on the config crate from the gateway crate).
#[derive(Debug, Clone)]
pub struct BindConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Assemble the full route tree.
///
/// `/health` is public; everything else sits behind the bearer-token
/// middleware. `/rooms/stream` is registered before the `{room_id}`
/// routes purely for readability; axum resolves the static segment first
/// either way.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/rooms",
            post(handlers::create_room).get(handlers::list_rooms),
        )
        .route("/rooms/stream", get(stream::stream_events))
        .route("/rooms/{room_id}/join", post(handlers::join_room))
        .route("/rooms/{room_id}/leave", post(handlers::leave_room))
        .route(
            "/rooms/{room_id}/messages",
            get(handlers::list_messages).post(handlers::post_message),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}",
            patch(handlers::edit_message).delete(handlers::delete_message),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}/reactions",
            post(handlers::toggle_reaction),
        )
        .route("/rooms/{room_id}/read", post(handlers::mark_read))
        .route("/rooms/{room_id}/typing", post(handlers::post_typing))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the process is stopped.
pub async fn start_server(config: &BindConfig, state: AppState) -> Result<(), HanashiError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HanashiError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| HanashiError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
