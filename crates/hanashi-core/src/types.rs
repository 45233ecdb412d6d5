// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Hanashi workspace.
//!
//! All wire-crossing structs serialize with camelCase field names to match
//! the HTTP API; timestamps are RFC 3339 UTC strings with millisecond
//! precision, which sort lexicographically in creation order.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current UTC time as an RFC 3339 string with millisecond precision.
///
/// The fixed-width format makes string comparison equivalent to time
/// comparison, which the cursor paging queries rely on.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Message type tag distinguishing user text from system notices and
/// attachment-bearing kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
    Image,
    File,
}

/// A file or image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Where the attachment content lives (external object storage).
    pub url: String,
    /// Display name.
    pub name: String,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One emoji reaction and the users who applied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_ids: Vec<String>,
}

/// A chat message as stored and served.
///
/// Identity and room reference are immutable after creation; content and
/// `edited_at` change only through the owner-checked edit path. Ordering is
/// by `created_at` ascending with ties broken by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned opaque id.
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Id of the message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    /// Users who have marked this message read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_by: Vec<String>,
    /// RFC 3339 UTC, millisecond precision.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    /// Sender-supplied tag echoed back in broadcasts so a client can match
    /// a stream event against its own in-flight send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<String>,
}

impl Message {
    /// Ordering key: creation time, ties broken by id.
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.created_at, &self.id)
    }
}

/// Participant role within a room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

/// One member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub role: Role,
    pub joined_at: String,
}

/// A conversation context with a participant set.
///
/// Invariants enforced by the store: a room is deleted when its last
/// participant leaves, and while it has two or more participants at least
/// one of them holds the admin role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_at: String,
    /// Bumped on every message; used to surface active rooms first.
    pub last_active_at: String,
    pub participants: Vec<Participant>,
}

impl Room {
    /// Whether the given user is a participant.
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn admin_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Admin)
            .count()
    }
}

/// Direction of a history page request relative to a cursor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PageDirection {
    /// The `limit` messages immediately preceding the cursor (older).
    #[default]
    Before,
    /// The `limit` messages immediately following the cursor (newer).
    After,
}

/// One page of room history, messages in ascending creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Whether more messages exist beyond this page in the paged direction.
    pub has_more: bool,
    /// Cursor at the oldest returned message, for paging further back.
    pub oldest_cursor: Option<String>,
    /// Cursor at the newest returned message, for paging forward.
    pub newest_cursor: Option<String>,
}

impl MessagePage {
    /// An empty page with nothing further in either direction.
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            has_more: false,
            oldest_cursor: None,
            newest_cursor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_message() -> Message {
        Message {
            id: "m-1".into(),
            room_id: "r-1".into(),
            sender_id: "u-1".into(),
            kind: MessageKind::Text,
            content: "hello".into(),
            attachments: vec![],
            reply_to: None,
            reactions: vec![],
            read_by: vec![],
            created_at: "2026-01-01T00:00:00.000Z".into(),
            edited_at: None,
            client_tag: None,
        }
    }

    #[test]
    fn message_serializes_camel_case_with_type_tag() {
        let json = serde_json::to_value(sample_message()).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["roomId"], "r-1");
        assert_eq!(json["senderId"], "u-1");
        assert_eq!(json["createdAt"], "2026-01-01T00:00:00.000Z");
        // Empty optional collections are omitted on the wire.
        assert!(json.get("attachments").is_none());
        assert!(json.get("editedAt").is_none());
    }

    #[test]
    fn message_round_trips() {
        let mut msg = sample_message();
        msg.attachments.push(Attachment {
            url: "https://files.example/a.png".into(),
            name: "a.png".into(),
            size: Some(2048),
        });
        msg.reactions.push(Reaction {
            emoji: "👍".into(),
            user_ids: vec!["u-2".into()],
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn message_kind_parses_wire_names() {
        assert_eq!(MessageKind::from_str("text").unwrap(), MessageKind::Text);
        assert_eq!(MessageKind::from_str("system").unwrap(), MessageKind::System);
        assert_eq!(MessageKind::from_str("image").unwrap(), MessageKind::Image);
        assert!(MessageKind::from_str("video").is_err());
    }

    #[test]
    fn sort_key_orders_by_time_then_id() {
        let a = sample_message();
        let mut b = sample_message();
        b.id = "m-2".into();
        assert!(a.sort_key() < b.sort_key());

        let mut c = sample_message();
        c.created_at = "2026-01-01T00:00:01.000Z".into();
        c.id = "m-0".into();
        assert!(b.sort_key() < c.sort_key());
    }

    #[test]
    fn now_rfc3339_is_fixed_width_millis() {
        let now = now_rfc3339();
        // e.g. 2026-08-25T12:34:56.789Z
        assert_eq!(now.len(), 24);
        assert!(now.ends_with('Z'));
        assert_eq!(&now[23..], "Z");
    }

    #[test]
    fn room_admin_invariant_helpers() {
        let room = Room {
            id: "r-1".into(),
            name: "general".into(),
            created_at: now_rfc3339(),
            last_active_at: now_rfc3339(),
            participants: vec![
                Participant {
                    user_id: "u-1".into(),
                    role: Role::Admin,
                    joined_at: now_rfc3339(),
                },
                Participant {
                    user_id: "u-2".into(),
                    role: Role::Member,
                    joined_at: now_rfc3339(),
                },
            ],
        };
        assert!(room.has_participant("u-1"));
        assert!(!room.has_participant("u-3"));
        assert_eq!(room.admin_count(), 1);
    }

    #[test]
    fn page_direction_wire_names() {
        assert_eq!(PageDirection::Before.to_string(), "before");
        assert_eq!(
            PageDirection::from_str("after").unwrap(),
            PageDirection::After
        );
    }
}
