// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client-side message window.
//!
//! [`MessageFeed`] owns one room's visible message history: a bounded,
//! gap-free, ascending window over the store's authoritative order. All
//! mutation funnels through its methods, so the windowing invariants hold
//! no matter how network responses and stream events interleave.
//!
//! The feed is an owned state machine under `&mut self` discipline. It
//! performs its own HTTP fetches but never opens the event stream; the
//! caller runs a [`crate::StreamConnection`] and forwards each event to
//! [`MessageFeed::apply_event`].

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use hanashi_core::types::{Attachment, Message, MessageKind, PageDirection};
use hanashi_core::{Cursor, HanashiError, StreamEvent};

use crate::api::{ChatApi, OutgoingMessage};
use crate::scroll::ScrollAnchor;

/// A follow-up the caller should perform after a feed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEffect {
    /// Scroll the view to the newest message.
    ScrollToBottom,
    /// Call [`MessageFeed::reconcile`]; the stream reconnected and events
    /// may have been missed.
    Reconcile,
}

/// Bounded window over one room's message history.
pub struct MessageFeed {
    api: ChatApi,
    room_id: String,
    page_size: u32,
    max_window: usize,

    messages: Vec<Message>,
    loading: bool,
    is_loading_more: bool,
    has_more: bool,
    oldest_cursor: Option<String>,
    error: Option<String>,

    /// Eviction dropped history the user had paged into.
    truncated: bool,
    /// The newest side was trimmed while paging back; the window is parked
    /// in history and no longer tracks the live tail.
    detached: bool,
    paged_back: bool,
    loaded_once: bool,

    connection_id: Option<String>,
    /// Client tags of sends whose confirm has not yet been accounted for.
    pending: HashSet<String>,
    on_typing: Option<Box<dyn FnMut(&str) + Send>>,
}

impl MessageFeed {
    pub fn new(api: ChatApi, room_id: impl Into<String>, page_size: u32, max_window: usize) -> Self {
        Self {
            api,
            room_id: room_id.into(),
            page_size,
            max_window: max_window.max(1),
            messages: Vec::new(),
            loading: false,
            is_loading_more: false,
            has_more: false,
            oldest_cursor: None,
            error: None,
            truncated: false,
            detached: false,
            paged_back: false,
            loaded_once: false,
            connection_id: None,
            pending: HashSet::new(),
            on_typing: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The window, ascending by `(created_at, id)`.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.is_loading_more
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn oldest_cursor(&self) -> Option<&str> {
        self.oldest_cursor.as_deref()
    }

    /// Last fetch or send failure, cleared by the next successful load.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether eviction dropped history the user had paged into.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the window is parked in history, off the live tail.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// The stream connection id, echoed on sends for echo suppression.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Number of sends awaiting their confirm or stream delivery.
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Registers the callback invoked with the typing user's id.
    pub fn set_typing_listener(&mut self, listener: impl FnMut(&str) + Send + 'static) {
        self.on_typing = Some(Box::new(listener));
    }

    /// Replaces the window with the newest page.
    ///
    /// Returns [`FeedEffect::ScrollToBottom`] on the first successful load
    /// only; later reloads keep the caller's scroll position choices.
    pub async fn initial_load(&mut self) -> Result<Option<FeedEffect>, HanashiError> {
        self.loading = true;
        let result = self
            .api
            .list_page(&self.room_id, None, PageDirection::Before, self.page_size)
            .await;
        self.loading = false;

        match result {
            Ok(page) => {
                self.messages = page.messages;
                self.has_more = page.has_more;
                self.oldest_cursor = page.oldest_cursor;
                self.error = None;
                self.truncated = false;
                self.detached = false;
                self.paged_back = false;
                // A page larger than the window cap is cut down like any
                // other overflow.
                self.trim_oldest();

                let effect = if self.loaded_once {
                    None
                } else {
                    Some(FeedEffect::ScrollToBottom)
                };
                self.loaded_once = true;
                Ok(effect)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn can_load_more(&self) -> bool {
        self.has_more && !self.loading && !self.is_loading_more && self.oldest_cursor.is_some()
    }

    /// Prepends the page older than `oldest_cursor`.
    ///
    /// No-op unless [`Self::can_load_more`]. The caller captures the
    /// container's [`ScrollAnchor`] before calling; it is handed back
    /// after a successful prepend so the viewport can be restored against
    /// the new scroll height. A failed fetch sets `error` and leaves the
    /// window untouched.
    pub async fn load_more(
        &mut self,
        anchor: Option<ScrollAnchor>,
    ) -> Result<Option<ScrollAnchor>, HanashiError> {
        if !self.can_load_more() {
            return Ok(None);
        }

        let cursor = self.oldest_cursor.clone();
        self.is_loading_more = true;
        let result = self
            .api
            .list_page(
                &self.room_id,
                cursor.as_deref(),
                PageDirection::Before,
                self.page_size,
            )
            .await;
        self.is_loading_more = false;

        match result {
            Ok(page) => {
                self.has_more = page.has_more;
                if page.messages.is_empty() {
                    self.oldest_cursor = None;
                    return Ok(None);
                }
                self.oldest_cursor = page.oldest_cursor;
                self.error = None;
                self.paged_back = true;

                let mut window = page.messages;
                window.append(&mut self.messages);
                self.messages = window;
                self.trim_newest();
                Ok(anchor)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Sends a message, appending the server-confirmed copy.
    ///
    /// The append happens only after the server assigns an id, and only if
    /// the same id has not already arrived through the stream. The
    /// generated client tag ties the confirm and the broadcast copy to
    /// this call either way.
    pub async fn send(
        &mut self,
        content: impl Into<String>,
        kind: MessageKind,
        attachments: Vec<Attachment>,
    ) -> Result<Message, HanashiError> {
        let tag = Uuid::new_v4().to_string();
        self.pending.insert(tag.clone());

        let outgoing = OutgoingMessage {
            content: content.into(),
            kind,
            attachments,
            reply_to: None,
            client_tag: Some(tag.clone()),
        };
        let result = self
            .api
            .send_message(&self.room_id, &outgoing, self.connection_id.as_deref())
            .await;

        match result {
            Ok(message) => {
                if !self.pending.remove(&tag) {
                    debug!(client_tag = %tag, "confirm already reconciled against stream delivery");
                }
                if !self.detached && self.insert_if_absent(message.clone()) {
                    self.trim_oldest();
                }
                Ok(message)
            }
            Err(e) => {
                self.pending.remove(&tag);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Notifies other participants that the user is typing.
    pub async fn send_typing(&self) -> Result<(), HanashiError> {
        self.api
            .send_typing(&self.room_id, self.connection_id.as_deref())
            .await
    }

    /// Applies one stream event to the window.
    ///
    /// Idempotent per event: receiving the same `new_message` twice, or an
    /// edit or delete for an id outside the window, leaves the window
    /// unchanged.
    pub fn apply_event(&mut self, event: StreamEvent) -> Option<FeedEffect> {
        match event {
            StreamEvent::Connected { connection_id } => {
                self.connection_id = Some(connection_id);
                // A connect after the first load means a gap to repair.
                if self.loaded_once {
                    Some(FeedEffect::Reconcile)
                } else {
                    None
                }
            }
            StreamEvent::NewMessage { message } => {
                if let Some(tag) = message.client_tag.as_deref() {
                    self.pending.remove(tag);
                }
                if self.detached {
                    return None;
                }
                if self.insert_if_absent(message) {
                    self.trim_oldest();
                }
                None
            }
            StreamEvent::MessageEdited { message } => {
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    *slot = message;
                }
                None
            }
            StreamEvent::MessageDeleted { message_id, .. } => {
                self.messages.retain(|m| m.id != message_id);
                None
            }
            StreamEvent::Typing { user_id, .. } => {
                if let Some(listener) = self.on_typing.as_mut() {
                    listener(&user_id);
                }
                None
            }
        }
    }

    /// Repairs the window against the store after a stream gap.
    ///
    /// Fetches the newest page and merges by id: edits are taken, entries
    /// covered by the fetched range but missing from it were deleted, and
    /// unseen messages are inserted. Older history below the fetched range
    /// is left alone. A detached window skips reconciliation entirely; it
    /// is rebuilt by the next [`Self::initial_load`].
    pub async fn reconcile(&mut self) -> Result<(), HanashiError> {
        if self.detached {
            return Ok(());
        }

        let page = match self
            .api
            .list_page(&self.room_id, None, PageDirection::Before, self.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.error = Some(e.to_string());
                return Err(e);
            }
        };

        if page.messages.is_empty() {
            if !page.has_more {
                // The room's history is empty now.
                self.messages.clear();
                self.has_more = false;
                self.oldest_cursor = None;
            }
            return Ok(());
        }

        for message in &page.messages {
            if let Some(tag) = message.client_tag.as_deref() {
                self.pending.remove(tag);
            }
        }

        if let Some(first) = page.messages.first() {
            let floor = (first.created_at.clone(), first.id.clone());
            let fetched: HashSet<&str> = page.messages.iter().map(|m| m.id.as_str()).collect();
            self.messages.retain(|m| {
                m.sort_key() < (floor.0.as_str(), floor.1.as_str())
                    || fetched.contains(m.id.as_str())
            });
        }

        for message in page.messages {
            if let Some(slot) = self.messages.iter_mut().find(|m| m.id == message.id) {
                *slot = message;
            } else {
                self.insert_if_absent(message);
            }
        }
        self.trim_oldest();
        Ok(())
    }

    /// Inserts in `(created_at, id)` order unless the id is present or the
    /// message falls below the window floor with unloaded history between.
    fn insert_if_absent(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        if self.has_more {
            if let Some(first) = self.messages.first() {
                // The window is a contiguous range; a below-floor arrival
                // belongs to history that was never loaded.
                if message.sort_key() < first.sort_key() {
                    return false;
                }
            }
        }
        let at = self
            .messages
            .partition_point(|m| m.sort_key() < message.sort_key());
        self.messages.insert(at, message);
        true
    }

    /// Evicts from the oldest side after tail appends.
    fn trim_oldest(&mut self) {
        if self.messages.len() <= self.max_window {
            return;
        }
        let excess = self.messages.len() - self.max_window;
        self.messages.drain(..excess);
        // The evicted entries still exist server-side.
        self.has_more = true;
        self.oldest_cursor = self
            .messages
            .first()
            .map(|m| Cursor::for_message(m).encode());
        if self.paged_back {
            self.truncated = true;
        }
    }

    /// Evicts from the newest side while paging backwards, detaching the
    /// window from the live tail.
    fn trim_newest(&mut self) {
        if self.messages.len() <= self.max_window {
            return;
        }
        self.messages.truncate(self.max_window);
        self.detached = true;
    }

    #[cfg(test)]
    fn register_pending(&mut self, tag: impl Into<String>) {
        self.pending.insert(tag.into());
    }
}
