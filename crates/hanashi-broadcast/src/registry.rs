// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room-keyed fan-out of stream events to live connections.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};
use uuid::Uuid;

use hanashi_core::StreamEvent;

struct Subscriber {
    connection_id: String,
    sender: mpsc::Sender<StreamEvent>,
}

type RoomMap = DashMap<String, Vec<Subscriber>>;

/// Fan-out registry mapping room ids to live stream connections.
///
/// An owned service shared behind `Arc`, never a global. Delivery is
/// best-effort with no replay: an event published while a client is
/// between connections is simply missed, and the client reconciles with
/// a history fetch when it reconnects.
pub struct BroadcastRegistry {
    rooms: Arc<RoomMap>,
}

/// One live stream connection's half of the registry.
///
/// Dropping the subscription unregisters the connection, so a stream
/// task that ends for any reason cleans up after itself.
pub struct Subscription {
    connection_id: String,
    room_id: String,
    receiver: mpsc::Receiver<StreamEvent>,
    rooms: Arc<RoomMap>,
}

impl Subscription {
    /// Server-assigned id, echoed to the client in the `connected` ack so
    /// it can ask publishers to skip its own connection.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next event for this connection. `None` once unregistered and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        remove_connection(&self.rooms, &self.room_id, &self.connection_id);
    }
}

fn remove_connection(rooms: &RoomMap, room_id: &str, connection_id: &str) {
    let mut now_empty = false;
    if let Some(mut subs) = rooms.get_mut(room_id) {
        subs.retain(|s| s.connection_id != connection_id);
        now_empty = subs.is_empty();
    }
    if now_empty {
        // Re-checked under the entry lock; a concurrent register wins.
        rooms.remove_if(room_id, |_, subs| subs.is_empty());
    }
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// Register a connection for a room and hand back its subscription.
    ///
    /// `capacity` bounds the per-connection buffer; a connection that
    /// falls that far behind is pruned on the next publish rather than
    /// blocking the publisher.
    pub fn register(&self, room_id: &str, capacity: usize) -> Subscription {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection_id = Uuid::new_v4().to_string();
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .push(Subscriber {
                connection_id: connection_id.clone(),
                sender,
            });
        debug!(room_id, %connection_id, "stream connection registered");
        Subscription {
            connection_id,
            room_id: room_id.to_string(),
            receiver,
            rooms: Arc::clone(&self.rooms),
        }
    }

    /// Deliver an event to every live connection in the room except
    /// `exclude`. Returns the number of successful deliveries.
    ///
    /// Connections whose channel is closed or full are pruned here, during
    /// the publish that notices them; a dead connection never aborts
    /// delivery to the rest of the room.
    pub fn publish(&self, room_id: &str, event: &StreamEvent, exclude: Option<&str>) -> usize {
        let Some(mut subs) = self.rooms.get_mut(room_id) else {
            return 0;
        };
        let mut delivered = 0;
        subs.retain(|sub| {
            if exclude == Some(sub.connection_id.as_str()) {
                return true;
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    debug!(room_id, connection_id = %sub.connection_id, "pruning lagging connection");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(room_id, connection_id = %sub.connection_id, "pruning closed connection");
                    false
                }
            }
        });
        let now_empty = subs.is_empty();
        drop(subs);
        if now_empty {
            self.rooms.remove_if(room_id, |_, subs| subs.is_empty());
        }
        trace!(room_id, event = event.name(), delivered, "event published");
        delivered
    }

    /// Remove a connection from a room. Idempotent; also runs when the
    /// subscription is dropped.
    pub fn unregister(&self, room_id: &str, connection_id: &str) {
        remove_connection(&self.rooms, room_id, connection_id);
    }

    /// Number of live connections in a room.
    pub fn connection_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|subs| subs.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one live connection.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(room: &str, user: &str) -> StreamEvent {
        StreamEvent::Typing {
            room_id: room.to_string(),
            user_id: user.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_room_subscriber() {
        let registry = BroadcastRegistry::new();
        let mut a = registry.register("r-1", 8);
        let mut b = registry.register("r-1", 8);

        let delivered = registry.publish("r-1", &typing("r-1", "alice"), None);
        assert_eq!(delivered, 2);

        assert_eq!(a.recv().await.unwrap().name(), "typing");
        assert_eq!(b.recv().await.unwrap().name(), "typing");
    }

    #[tokio::test]
    async fn excluded_connection_is_skipped_but_kept() {
        let registry = BroadcastRegistry::new();
        let mut sender_conn = registry.register("r-1", 8);
        let mut other = registry.register("r-1", 8);

        let excluded = sender_conn.connection_id().to_string();
        let delivered = registry.publish("r-1", &typing("r-1", "alice"), Some(&excluded));
        assert_eq!(delivered, 1);
        assert!(other.recv().await.is_some());

        // The excluded connection stays registered and gets later events.
        assert_eq!(registry.connection_count("r-1"), 2);
        registry.publish("r-1", &typing("r-1", "bob"), None);
        assert!(sender_conn.recv().await.is_some());
    }

    #[tokio::test]
    async fn events_do_not_cross_rooms() {
        let registry = BroadcastRegistry::new();
        let _listener_a = registry.register("r-a", 8);
        let mut listener_b = registry.register("r-b", 8);

        let delivered = registry.publish("r-b", &typing("r-b", "alice"), None);
        assert_eq!(delivered, 1);
        match listener_b.recv().await.unwrap() {
            StreamEvent::Typing { room_id, .. } => assert_eq!(room_id, "r-b"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(registry.publish("r-empty", &typing("r-empty", "x"), None), 0);
    }

    #[tokio::test]
    async fn dropping_a_subscription_unregisters_it() {
        let registry = BroadcastRegistry::new();
        let sub = registry.register("r-1", 8);
        assert_eq!(registry.connection_count("r-1"), 1);
        assert_eq!(registry.room_count(), 1);

        drop(sub);
        assert_eq!(registry.connection_count("r-1"), 0);
        assert_eq!(registry.room_count(), 0, "empty room entry is removed");
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = BroadcastRegistry::new();
        let sub = registry.register("r-1", 8);
        let id = sub.connection_id().to_string();

        registry.unregister("r-1", &id);
        registry.unregister("r-1", &id);
        registry.unregister("r-1", "never-registered");
        assert_eq!(registry.connection_count("r-1"), 0);
    }

    #[tokio::test]
    async fn full_buffer_prunes_the_lagging_connection_only() {
        let registry = BroadcastRegistry::new();
        let _laggard = registry.register("r-1", 1);
        let mut healthy = registry.register("r-1", 8);

        // First event fills the laggard's single-slot buffer.
        assert_eq!(registry.publish("r-1", &typing("r-1", "a"), None), 2);
        // Second publish finds it full and prunes it mid-delivery.
        assert_eq!(registry.publish("r-1", &typing("r-1", "b"), None), 1);
        assert_eq!(registry.connection_count("r-1"), 1);

        assert!(healthy.recv().await.is_some());
        assert!(healthy.recv().await.is_some());
    }

    #[tokio::test]
    async fn recv_ends_after_unregister_drains() {
        let registry = BroadcastRegistry::new();
        let mut sub = registry.register("r-1", 8);
        registry.publish("r-1", &typing("r-1", "alice"), None);
        registry.unregister("r-1", sub.connection_id().to_string().as_str());

        // Buffered event is still delivered, then the stream ends.
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
