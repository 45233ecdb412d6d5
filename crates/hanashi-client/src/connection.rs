// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event stream lifecycle management.
//!
//! [`StreamConnection`] keeps one room's SSE stream alive: it connects,
//! forwards events into a channel, and on any stream failure backs off
//! and reconnects with jitterless exponential delay. Recovery of events
//! missed during the gap is the feed's job; every successful reconnect
//! delivers a fresh `connected` event, which
//! [`crate::MessageFeed::apply_event`] answers with a reconcile request.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use hanashi_core::StreamEvent;

use crate::api::ChatApi;

/// Where the connection currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

/// Reconnecting SSE subscription to one room's event stream.
pub struct StreamConnection {
    api: ChatApi,
    room_id: String,
    backoff_base: Duration,
    backoff_cap: Duration,
    state: watch::Sender<ConnectionState>,
}

impl StreamConnection {
    pub fn new(
        api: ChatApi,
        room_id: impl Into<String>,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            api,
            room_id: room_id.into(),
            backoff_base: backoff_base.max(Duration::from_millis(1)),
            backoff_cap: backoff_cap.max(backoff_base),
            state,
        }
    }

    /// Observes lifecycle transitions; the receiver outlives [`Self::run`].
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, forward, back off, repeat.
    ///
    /// Returns when `events` has no receiver left. A caller that wants to
    /// stop a healthy but idle stream aborts the task instead.
    pub async fn run(self, events: mpsc::Sender<StreamEvent>) {
        let mut backoff = self.backoff_base;

        loop {
            self.transition(ConnectionState::Connecting);
            match self.api.open_stream(&self.room_id).await {
                Ok(mut stream) => {
                    self.transition(ConnectionState::Connected);
                    backoff = self.backoff_base;

                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(event) => {
                                if events.send(event).await.is_err() {
                                    self.transition(ConnectionState::Disconnected);
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, room_id = %self.room_id, "event stream failed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, room_id = %self.room_id, "could not open event stream");
                }
            }

            if events.is_closed() {
                self.transition(ConnectionState::Disconnected);
                return;
            }

            self.transition(ConnectionState::Backoff);
            debug!(delay_ms = backoff.as_millis() as u64, "waiting before reconnect");
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, self.backoff_cap);
        }
    }

    fn transition(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!(from = ?prev, to = ?next, room_id = %self.room_id, "stream connection state");
        }
    }
}

/// Jitterless doubling, clamped to the cap.
fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}
