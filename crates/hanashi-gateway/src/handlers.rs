// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the chat REST API.
//!
//! Every mutation persists through the [`ChatStore`] first and only then
//! publishes to the broadcast registry, so a client that misses the event
//! still sees the change on its next history fetch. Broadcast failures
//! never surface to the HTTP caller.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hanashi_core::types::{Attachment, Message, MessageKind, PageDirection, Room};
use hanashi_core::{HanashiError, StreamEvent};
use hanashi_storage::{LeaveOutcome, NewMessage};

use crate::auth::CallerIdentity;
use crate::server::AppState;

/// Error wrapper mapping the workspace taxonomy onto HTTP statuses.
///
/// Everything outside the caller-facing taxonomy becomes a 500 with a
/// generic body; the details go to the log, not the wire.
pub struct ApiError(pub HanashiError);

impl From<HanashiError> for ApiError {
    fn from(err: HanashiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            HanashiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            HanashiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            HanashiError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            HanashiError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

/// Request body for POST /rooms/{room_id}/messages.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub client_tag: Option<String>,
}

/// Request body for PATCH /rooms/{room_id}/messages/{message_id}.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub content: String,
}

/// Request body for POST .../reactions.
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

/// Request body for POST /rooms/{room_id}/read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub up_to_message_id: String,
}

/// Request body for POST /rooms.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

/// Query parameters for GET /rooms/{room_id}/messages.
#[derive(Debug, Default, Deserialize)]
pub struct ListMessagesQuery {
    pub cursor: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub has_more: bool,
    pub oldest_cursor: Option<String>,
    pub newest_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub success: bool,
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub success: bool,
    pub room: Room,
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub success: bool,
    pub rooms: Vec<Room>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub marked: usize,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// The sender's own stream connection id, when it wants to be excluded
/// from the resulting broadcast.
fn connection_id_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(hanashi_core::CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn ensure_participant(
    state: &AppState,
    room_id: &str,
    user_id: &str,
) -> Result<(), ApiError> {
    if !state.store.is_participant(room_id, user_id).await? {
        return Err(HanashiError::Forbidden(format!(
            "{user_id} is not a participant of room {room_id}"
        ))
        .into());
    }
    Ok(())
}

/// GET /rooms/{room_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    ensure_participant(&state, &room_id, &caller.user_id).await?;

    let direction = match query.direction.as_deref() {
        None => PageDirection::Before,
        Some(raw) => raw.parse::<PageDirection>().map_err(|_| {
            HanashiError::Validation(format!("unknown direction {raw:?}, expected before or after"))
        })?,
    };
    let limit = query.limit.unwrap_or(state.default_page_size);

    let page = state
        .store
        .list_page(&room_id, query.cursor.as_deref(), direction, limit)
        .await?;
    Ok(Json(MessageListResponse {
        success: true,
        messages: page.messages,
        pagination: Pagination {
            has_more: page.has_more,
            oldest_cursor: page.oldest_cursor,
            newest_cursor: page.newest_cursor,
        },
    }))
}

/// POST /rooms/{room_id}/messages
///
/// Persists the message, then broadcasts `new_message` to the room. A
/// sender that supplied its stream connection id via `X-Connection-Id`
/// is excluded from the fan-out; it already has the message from the
/// HTTP response.
pub async fn post_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if body.kind == MessageKind::System {
        return Err(
            HanashiError::Validation("system messages cannot be posted by users".into()).into(),
        );
    }
    let message = state
        .store
        .create_message(NewMessage {
            room_id,
            sender_id: caller.user_id,
            kind: body.kind,
            content: body.content,
            attachments: body.attachments,
            reply_to: body.reply_to,
            client_tag: body.client_tag,
        })
        .await?;

    let exclude = connection_id_header(&headers);
    let delivered = state.registry.publish(
        &message.room_id,
        &StreamEvent::NewMessage {
            message: message.clone(),
        },
        exclude.as_deref(),
    );
    debug!(message_id = %message.id, delivered, "message created");

    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// PATCH /rooms/{room_id}/messages/{message_id}
pub async fn edit_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state
        .store
        .edit_message(&room_id, &message_id, &caller.user_id, &body.content)
        .await?;

    state.registry.publish(
        &room_id,
        &StreamEvent::MessageEdited {
            message: message.clone(),
        },
        None,
    );

    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// DELETE /rooms/{room_id}/messages/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .store
        .delete_message(&room_id, &message_id, &caller.user_id)
        .await?;

    state.registry.publish(
        &room_id,
        &StreamEvent::MessageDeleted {
            message_id,
            room_id: room_id.clone(),
        },
        None,
    );

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /rooms/{room_id}/messages/{message_id}/reactions
///
/// Reaction changes ride the `message_edited` event; subscribers replace
/// the message wholesale, so no dedicated reaction event is needed.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state
        .store
        .toggle_reaction(&room_id, &message_id, &caller.user_id, &body.emoji)
        .await?;

    state.registry.publish(
        &room_id,
        &StreamEvent::MessageEdited {
            message: message.clone(),
        },
        None,
    );

    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// POST /rooms/{room_id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let marked = state
        .store
        .mark_read(&room_id, &caller.user_id, &body.up_to_message_id)
        .await?;
    Ok(Json(MarkReadResponse {
        success: true,
        marked,
    }))
}

/// POST /rooms/{room_id}/typing
///
/// Pure broadcast; nothing is persisted. The typer's own connection is
/// excluded the same way as for sends.
pub async fn post_typing(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, ApiError> {
    ensure_participant(&state, &room_id, &caller.user_id).await?;

    let exclude = connection_id_header(&headers);
    state.registry.publish(
        &room_id,
        &StreamEvent::Typing {
            room_id: room_id.clone(),
            user_id: caller.user_id,
        },
        exclude.as_deref(),
    );
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /rooms
pub async fn create_room(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<RoomResponse>, ApiError> {
    let room = state.store.create_room(&body.name, &caller.user_id).await?;
    Ok(Json(RoomResponse {
        success: true,
        room,
    }))
}

/// GET /rooms
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<RoomListResponse>, ApiError> {
    let rooms = state.store.list_rooms(&caller.user_id).await?;
    Ok(Json(RoomListResponse {
        success: true,
        rooms,
    }))
}

/// POST /rooms/{room_id}/join
///
/// Idempotent. A first-time join drops a system notice into the room so
/// existing members see the arrival in their history as well as live.
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<RoomResponse>, ApiError> {
    let (room, newly_joined) = state.store.join_room(&room_id, &caller.user_id).await?;
    if newly_joined {
        publish_notice(&state, &room_id, &format!("{} joined the room", caller.user_id)).await;
    }
    Ok(Json(RoomResponse {
        success: true,
        room,
    }))
}

/// POST /rooms/{room_id}/leave
pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let outcome = state.store.leave_room(&room_id, &caller.user_id).await?;
    match outcome {
        LeaveOutcome::Left => {
            publish_notice(&state, &room_id, &format!("{} left the room", caller.user_id)).await;
        }
        LeaveOutcome::LeftAndPromoted(successor) => {
            publish_notice(&state, &room_id, &format!("{} left the room", caller.user_id)).await;
            publish_notice(&state, &room_id, &format!("{successor} is now an admin")).await;
        }
        // Room gone; nobody is left to notify.
        LeaveOutcome::LeftAndDeleted => {}
        // remove_member outcomes already mapped to errors by the store.
        LeaveOutcome::NotMember | LeaveOutcome::RoomMissing => {}
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// Persist and broadcast a system notice. Failure to persist only loses
/// the notice, never the operation that triggered it.
async fn publish_notice(state: &AppState, room_id: &str, content: &str) {
    match state.store.create_system_notice(room_id, content).await {
        Ok(notice) => {
            state
                .registry
                .publish(room_id, &StreamEvent::NewMessage { message: notice }, None);
        }
        Err(err) => {
            tracing::warn!(room_id, error = %err, "failed to record system notice");
        }
    }
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_request_fills_defaults() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(req.content, "hello");
        assert_eq!(req.kind, MessageKind::Text);
        assert!(req.attachments.is_empty());
        assert!(req.reply_to.is_none());
        assert!(req.client_tag.is_none());
    }

    #[test]
    fn send_request_accepts_full_payload() {
        let json = r#"{
            "content": "see attached",
            "type": "file",
            "attachments": [{"url": "https://files.example/a.pdf", "name": "a.pdf"}],
            "replyTo": "m-1",
            "clientTag": "tag-42"
        }"#;
        let req: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.kind, MessageKind::File);
        assert_eq!(req.attachments.len(), 1);
        assert_eq!(req.reply_to.as_deref(), Some("m-1"));
        assert_eq!(req.client_tag.as_deref(), Some("tag-42"));
    }

    #[test]
    fn mark_read_request_uses_camel_case() {
        let req: MarkReadRequest =
            serde_json::from_str(r#"{"upToMessageId": "m-9"}"#).unwrap();
        assert_eq!(req.up_to_message_id, "m-9");
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let page = Pagination {
            has_more: true,
            oldest_cursor: Some("abc".into()),
            newest_cursor: None,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["hasMore"], true);
        assert_eq!(json["oldestCursor"], "abc");
        assert!(json["newestCursor"].is_null());
    }

    #[test]
    fn error_body_shape() {
        let json = serde_json::to_string(&ErrorBody {
            success: false,
            error: "not found: room r-1".into(),
        })
        .unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("not found"));
    }

    #[test]
    fn api_error_maps_taxonomy_to_statuses() {
        let cases = [
            (HanashiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                HanashiError::Forbidden("nope".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                HanashiError::NotFound("room".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                HanashiError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                HanashiError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
