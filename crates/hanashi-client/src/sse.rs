// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for the chat event stream.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`]s
//! using the `eventsource-stream` crate for SSE protocol compliance.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};

use hanashi_core::{HanashiError, StreamEvent};

/// Parses a streaming response into typed [`StreamEvent`]s.
///
/// Each SSE frame's data payload is a JSON object whose `type` field
/// matches the SSE event name, so deserialization dispatches on the
/// payload alone. Unknown event names are silently skipped; a newer
/// server may emit kinds this client does not know.
pub fn parse_event_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, HanashiError>> + Send>> {
    let byte_stream = response.bytes_stream();
    let event_stream = byte_stream.eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => match event.event.as_str() {
                "connected" | "new_message" | "message_edited" | "message_deleted" | "typing" => {
                    Some(
                        serde_json::from_str::<StreamEvent>(&event.data).map_err(|e| {
                            HanashiError::Stream {
                                message: format!("failed to parse {} event: {e}", event.event),
                                source: Some(Box::new(e)),
                            }
                        }),
                    )
                }
                _ => None,
            },
            Err(e) => Some(Err(HanashiError::Stream {
                message: format!("SSE stream error: {e}"),
                source: Some(Box::new(e)),
            })),
        }
    });

    Box::pin(mapped)
}
