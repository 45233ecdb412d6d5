// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat client library for Hanashi.
//!
//! Wraps the HTTP API ([`ChatApi`]), keeps a room's event stream alive
//! ([`StreamConnection`]), and maintains the bounded client-side message
//! window ([`MessageFeed`]). [`VirtualList`] and [`ScrollAnchor`] support
//! renderers that virtualize long histories.
//!
//! A typical client wires these together as:
//!
//! ```text
//! StreamConnection::run ── mpsc ──> MessageFeed::apply_event
//!                                        │ FeedEffect::Reconcile
//!                                        └──> MessageFeed::reconcile
//! ```

pub mod api;
pub mod connection;
pub mod feed;
pub mod scroll;
pub mod sse;
pub mod virtual_list;

pub use api::{ChatApi, OutgoingMessage};
pub use connection::{ConnectionState, StreamConnection};
pub use feed::{FeedEffect, MessageFeed};
pub use scroll::ScrollAnchor;
pub use virtual_list::{VirtualList, VisibleRange};
