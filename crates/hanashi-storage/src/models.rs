// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `hanashi-core::types` and shared with
//! the gateway and client. This module re-exports them for convenience
//! within the storage crate.

pub use hanashi_core::types::{
    Attachment, Message, MessageKind, MessagePage, PageDirection, Participant, Reaction, Role,
    Room,
};
