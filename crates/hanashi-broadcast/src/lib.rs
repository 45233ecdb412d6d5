// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broadcast of chat stream events.
//!
//! The gateway publishes every mutation (new message, edit, delete,
//! typing) into a [`BroadcastRegistry`]; each live SSE connection holds a
//! [`Subscription`] it drains into its response stream. Fan-out is
//! best-effort and bounded per connection, so one dead or lagging client
//! never stalls the rest of a room.

pub mod registry;

pub use registry::{BroadcastRegistry, Subscription};
