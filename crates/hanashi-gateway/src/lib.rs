// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Hanashi chat service.
//!
//! Serves the room and message REST API plus a long-lived SSE stream per
//! connection. Handlers persist through `hanashi-storage` first, then
//! fan events out through `hanashi-broadcast`; a client that misses a
//! broadcast reconciles from history, so the stream never has to be
//! reliable, only fresh.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod stream;

pub use auth::{AuthConfig, CallerIdentity};
pub use server::{build_router, start_server, AppState, BindConfig};
