// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events endpoint for live room updates.
//!
//! Wire format, one frame per registry event:
//! ```text
//! event: connected
//! data: {"type":"connected","connectionId":"..."}
//!
//! event: new_message
//! data: {"type":"new_message","message":{...}}
//! ```
//!
//! The `connected` ack always comes first so the client learns its
//! connection id before any event can race it; the client echoes that id
//! in `X-Connection-Id` to keep its own sends out of its stream.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use hanashi_core::{HanashiError, StreamEvent};

use crate::auth::CallerIdentity;
use crate::handlers::ApiError;
use crate::server::AppState;

/// Query parameters for GET /rooms/stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub room_id: String,
}

fn frame(event: &StreamEvent) -> Result<Event, Infallible> {
    let data = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to encode stream event");
            "{}".to_string()
        }
    };
    Ok(Event::default().event(event.name()).data(data))
}

/// GET /rooms/stream?roomId=
///
/// Long-lived stream of room events for one participant. Registers with
/// the broadcast registry for the life of the response; dropping the
/// stream (client disconnect) unregisters the connection.
pub async fn stream_events(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let room_id = query.room_id;
    if !state.store.is_participant(&room_id, &caller.user_id).await? {
        return Err(HanashiError::Forbidden(format!(
            "{} is not a participant of room {room_id}",
            caller.user_id
        ))
        .into());
    }

    let subscription = state.registry.register(&room_id, state.stream_buffer);
    info!(
        room_id,
        connection_id = subscription.connection_id(),
        user_id = caller.user_id,
        "stream connected"
    );

    let connected = StreamEvent::Connected {
        connection_id: subscription.connection_id().to_string(),
    };
    let ack = stream::iter([frame(&connected)]);
    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((frame(&event), subscription))
    });

    Ok(Sse::new(ack.chain(events)).keep_alive(KeepAlive::default()))
}
