// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events pushed to stream subscribers.
//!
//! Every event serializes as a JSON object with a `type` discriminant, so
//! clients can dispatch on one field whether they read the SSE `event:`
//! name or the payload itself.

use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Request header carrying the sender's stream connection id.
///
/// The gateway skips this connection when broadcasting `new_message` and
/// `typing` events, so a sender never receives its own echo.
pub const CONNECTION_ID_HEADER: &str = "x-connection-id";

/// A server-to-client stream event.
///
/// `Connected` is sent once per stream, before any broadcast traffic, and
/// carries the connection id the client echoes back on sends to suppress
/// its own echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    NewMessage {
        message: Message,
    },
    MessageEdited {
        message: Message,
    },
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Typing {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl StreamEvent {
    /// The SSE `event:` field name, identical to the JSON `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::NewMessage { .. } => "new_message",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::Typing { .. } => "typing",
        }
    }

    /// Room the event belongs to, if any. `Connected` is per-stream and
    /// has no room.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::Connected { .. } => None,
            Self::NewMessage { message } | Self::MessageEdited { message } => {
                Some(&message.room_id)
            }
            Self::MessageDeleted { room_id, .. } | Self::Typing { room_id, .. } => Some(room_id),
        }
    }
}
