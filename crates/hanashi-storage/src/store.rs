// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! High-level chat store over the typed query modules.
//!
//! All business rules live here: membership and ownership checks, content
//! validation, cursor decoding, and the room invariants (creator becomes
//! admin, empty rooms are deleted, a room never loses its last admin while
//! members remain). The query modules below stay rule-free.

use tracing::debug;
use uuid::Uuid;

use hanashi_core::types::{
    Attachment, Message, MessageKind, MessagePage, PageDirection, Participant, Role, Room,
};
use hanashi_core::{now_rfc3339, Cursor, HanashiError};

use crate::database::Database;
use crate::queries;

pub use crate::queries::rooms::LeaveOutcome;

/// Sender id used for server-generated notices.
pub const SYSTEM_SENDER: &str = "system";

const MIN_PAGE_LIMIT: i64 = 1;
const MAX_PAGE_LIMIT: i64 = 100;

/// Input for [`ChatStore::create_message`]. Id and timestamps are
/// server-assigned on insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
    pub client_tag: Option<String>,
}

/// SQLite-backed chat store.
///
/// Cheap to clone; clones share the one background connection.
#[derive(Clone)]
pub struct ChatStore {
    db: Database,
}

impl ChatStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint the WAL ahead of shutdown.
    pub async fn close(&self) -> Result<(), HanashiError> {
        self.db.close().await
    }

    // --- Rooms ---

    /// Create a room; the creator joins immediately as admin.
    pub async fn create_room(&self, name: &str, creator_id: &str) -> Result<Room, HanashiError> {
        if name.trim().is_empty() {
            return Err(HanashiError::Validation("room name cannot be empty".into()));
        }
        let now = now_rfc3339();
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now.clone(),
            last_active_at: now.clone(),
            participants: vec![Participant {
                user_id: creator_id.to_string(),
                role: Role::Admin,
                joined_at: now,
            }],
        };
        queries::rooms::insert_room(&self.db, &room).await?;
        debug!(room_id = %room.id, creator = creator_id, "room created");
        Ok(room)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, HanashiError> {
        queries::rooms::get_room(&self.db, room_id)
            .await?
            .ok_or_else(|| HanashiError::NotFound(format!("room {room_id}")))
    }

    /// Rooms the user belongs to, most recently active first.
    pub async fn list_rooms(&self, user_id: &str) -> Result<Vec<Room>, HanashiError> {
        queries::rooms::list_rooms_for(&self.db, user_id).await
    }

    /// Join a room as a member. Idempotent; the returned flag is `true`
    /// only when the user was newly added.
    pub async fn join_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(Room, bool), HanashiError> {
        if !queries::rooms::room_exists(&self.db, room_id).await? {
            return Err(HanashiError::NotFound(format!("room {room_id}")));
        }
        let participant = Participant {
            user_id: user_id.to_string(),
            role: Role::Member,
            joined_at: now_rfc3339(),
        };
        let newly_joined = queries::rooms::add_member(&self.db, room_id, &participant).await?;
        let room = self.get_room(room_id).await?;
        Ok((room, newly_joined))
    }

    /// Leave a room. The last member's departure deletes the room; an
    /// admin's departure promotes the longest-standing member if no other
    /// admin remains.
    pub async fn leave_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<LeaveOutcome, HanashiError> {
        match queries::rooms::remove_member(&self.db, room_id, user_id).await? {
            LeaveOutcome::RoomMissing => Err(HanashiError::NotFound(format!("room {room_id}"))),
            LeaveOutcome::NotMember => Err(HanashiError::Forbidden(format!(
                "{user_id} is not a participant of room {room_id}"
            ))),
            outcome => {
                debug!(room_id, user_id, ?outcome, "participant left");
                Ok(outcome)
            }
        }
    }

    /// Whether the user belongs to the room. `NotFound` if the room
    /// itself is missing.
    pub async fn is_participant(&self, room_id: &str, user_id: &str) -> Result<bool, HanashiError> {
        if !queries::rooms::room_exists(&self.db, room_id).await? {
            return Err(HanashiError::NotFound(format!("room {room_id}")));
        }
        Ok(queries::rooms::membership(&self.db, room_id, user_id)
            .await?
            .is_some())
    }

    pub async fn touch_room(&self, room_id: &str) -> Result<(), HanashiError> {
        queries::rooms::touch(&self.db, room_id, &now_rfc3339()).await
    }

    // --- Messages ---

    /// Persist a new message from a room participant.
    pub async fn create_message(&self, new: NewMessage) -> Result<Message, HanashiError> {
        if new.content.trim().is_empty() && new.attachments.is_empty() {
            return Err(HanashiError::Validation(
                "message content cannot be empty".into(),
            ));
        }
        let room = self.get_room(&new.room_id).await?;
        if !room.has_participant(&new.sender_id) {
            return Err(HanashiError::Forbidden(format!(
                "{} is not a participant of room {}",
                new.sender_id, new.room_id
            )));
        }
        if let Some(reply_to) = &new.reply_to {
            let target = queries::messages::get_message(&self.db, reply_to).await?;
            let in_room = target.map(|m| m.room_id == new.room_id).unwrap_or(false);
            if !in_room {
                return Err(HanashiError::Validation(format!(
                    "replyTo {reply_to} does not name a message in room {}",
                    new.room_id
                )));
            }
        }

        let msg = Message {
            id: Uuid::new_v4().to_string(),
            room_id: new.room_id,
            sender_id: new.sender_id,
            kind: new.kind,
            content: new.content,
            attachments: new.attachments,
            reply_to: new.reply_to,
            reactions: Vec::new(),
            read_by: Vec::new(),
            created_at: now_rfc3339(),
            edited_at: None,
            client_tag: new.client_tag,
        };
        queries::messages::insert_message(&self.db, &msg).await?;
        Ok(msg)
    }

    /// Persist a server-generated notice (joins, leaves, promotions).
    /// Skips the participant check; the sender is [`SYSTEM_SENDER`].
    pub async fn create_system_notice(
        &self,
        room_id: &str,
        content: &str,
    ) -> Result<Message, HanashiError> {
        if !queries::rooms::room_exists(&self.db, room_id).await? {
            return Err(HanashiError::NotFound(format!("room {room_id}")));
        }
        let msg = Message {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender_id: SYSTEM_SENDER.to_string(),
            kind: MessageKind::System,
            content: content.to_string(),
            attachments: Vec::new(),
            reply_to: None,
            reactions: Vec::new(),
            read_by: Vec::new(),
            created_at: now_rfc3339(),
            edited_at: None,
            client_tag: None,
        };
        queries::messages::insert_message(&self.db, &msg).await?;
        Ok(msg)
    }

    /// Fetch a message, scoped to the room it is addressed under.
    pub async fn get_message(
        &self,
        room_id: &str,
        message_id: &str,
    ) -> Result<Message, HanashiError> {
        let msg = queries::messages::get_message(&self.db, message_id)
            .await?
            .ok_or_else(|| HanashiError::NotFound(format!("message {message_id}")))?;
        if msg.room_id != room_id {
            return Err(HanashiError::NotFound(format!("message {message_id}")));
        }
        Ok(msg)
    }

    /// One page of room history.
    ///
    /// `cursor` is the opaque token from a previous page (or `None` for the
    /// edge of history). `limit` is clamped to [1, 100]. `Before` with no
    /// cursor returns the newest page, which is how a client opens a room.
    pub async fn list_page(
        &self,
        room_id: &str,
        cursor: Option<&str>,
        direction: PageDirection,
        limit: i64,
    ) -> Result<MessagePage, HanashiError> {
        if !queries::rooms::room_exists(&self.db, room_id).await? {
            return Err(HanashiError::NotFound(format!("room {room_id}")));
        }
        let cursor = match cursor {
            Some(token) => Some(Cursor::decode(token)?),
            None => None,
        };
        let limit = limit.clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT);

        let (messages, has_more) =
            queries::messages::list_page(&self.db, room_id, cursor, direction, limit).await?;
        if messages.is_empty() {
            return Ok(MessagePage::empty());
        }
        let oldest_cursor = messages.first().map(|m| Cursor::for_message(m).encode());
        let newest_cursor = messages.last().map(|m| Cursor::for_message(m).encode());
        Ok(MessagePage {
            messages,
            has_more,
            oldest_cursor,
            newest_cursor,
        })
    }

    /// Edit a message's content. Only the original sender may edit, and
    /// system notices are never editable. Last write wins on concurrent
    /// edits.
    pub async fn edit_message(
        &self,
        room_id: &str,
        message_id: &str,
        caller: &str,
        new_content: &str,
    ) -> Result<Message, HanashiError> {
        if new_content.trim().is_empty() {
            return Err(HanashiError::Validation(
                "message content cannot be empty".into(),
            ));
        }
        let msg = self.get_message(room_id, message_id).await?;
        if msg.kind == MessageKind::System {
            return Err(HanashiError::Forbidden(
                "system messages cannot be edited".into(),
            ));
        }
        if msg.sender_id != caller {
            return Err(HanashiError::Forbidden(
                "only the sender may edit a message".into(),
            ));
        }
        let edited_at = now_rfc3339();
        let updated =
            queries::messages::update_content(&self.db, message_id, new_content, &edited_at)
                .await?;
        if !updated {
            return Err(HanashiError::NotFound(format!("message {message_id}")));
        }
        self.get_message(room_id, message_id).await
    }

    /// Delete a message. The sender may always delete their own; room
    /// admins may delete anyone's.
    pub async fn delete_message(
        &self,
        room_id: &str,
        message_id: &str,
        caller: &str,
    ) -> Result<(), HanashiError> {
        let msg = self.get_message(room_id, message_id).await?;
        if msg.sender_id != caller {
            let role = queries::rooms::membership(&self.db, room_id, caller).await?;
            if role != Some(Role::Admin) {
                return Err(HanashiError::Forbidden(
                    "only the sender or a room admin may delete a message".into(),
                ));
            }
        }
        queries::messages::delete_message(&self.db, message_id).await?;
        debug!(room_id, message_id, caller, "message deleted");
        Ok(())
    }

    /// Toggle the caller's emoji reaction and return the updated message.
    pub async fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: &str,
        caller: &str,
        emoji: &str,
    ) -> Result<Message, HanashiError> {
        if emoji.trim().is_empty() {
            return Err(HanashiError::Validation("emoji cannot be empty".into()));
        }
        self.get_message(room_id, message_id).await?;
        if !self.is_participant(room_id, caller).await? {
            return Err(HanashiError::Forbidden(format!(
                "{caller} is not a participant of room {room_id}"
            )));
        }
        queries::messages::toggle_reaction(&self.db, message_id, caller, emoji, &now_rfc3339())
            .await?;
        self.get_message(room_id, message_id).await
    }

    /// Mark every message up to and including `up_to_message_id` as read
    /// by the caller. Returns how many were newly marked.
    pub async fn mark_read(
        &self,
        room_id: &str,
        caller: &str,
        up_to_message_id: &str,
    ) -> Result<usize, HanashiError> {
        if !self.is_participant(room_id, caller).await? {
            return Err(HanashiError::Forbidden(format!(
                "{caller} is not a participant of room {room_id}"
            )));
        }
        let up_to = self.get_message(room_id, up_to_message_id).await?;
        queries::messages::mark_read(
            &self.db,
            room_id,
            caller,
            &up_to.created_at,
            &up_to.id,
            &now_rfc3339(),
        )
        .await
    }
}
