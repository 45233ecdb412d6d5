// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the gateway.
//!
//! Resolves `Authorization: Bearer <token>` against a static token table
//! and attaches the resulting [`CallerIdentity`] to the request. With an
//! empty token table all requests are rejected (fail-closed).

use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use hanashi_core::HanashiError;

use crate::handlers::ApiError;

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Bearer token -> user id. Identity lives outside this service; the
    /// table is provisioned through configuration.
    pub tokens: HashMap<String, String>,
}

impl AuthConfig {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

/// The authenticated caller, available to handlers via request extensions.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
}

/// Middleware validating the bearer token on every API route.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if auth.tokens.is_empty() {
        tracing::error!("gateway has no auth tokens configured -- rejecting request");
        return Err(HanashiError::Unauthorized.into());
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        if let Some(user_id) = auth.tokens.get(token) {
            request.extensions_mut().insert(CallerIdentity {
                user_id: user_id.clone(),
            });
            return Ok(next.run(request).await);
        }
    }

    Err(HanashiError::Unauthorized.into())
}
