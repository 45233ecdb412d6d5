// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Hanashi chat stack.
//!
//! This crate provides the domain types, error type, stream events, and
//! pagination cursors shared by the server and client crates. It contains
//! no I/O; everything here is plain data and the rules for encoding it.

pub mod cursor;
pub mod error;
pub mod event;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use cursor::Cursor;
pub use error::HanashiError;
pub use event::{StreamEvent, CONNECTION_ID_HEADER};
pub use types::{
    now_rfc3339, Attachment, Message, MessageKind, MessagePage, PageDirection, Participant,
    Reaction, Role, Room,
};
