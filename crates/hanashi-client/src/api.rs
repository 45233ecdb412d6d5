// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Hanashi chat API.
//!
//! Provides [`ChatApi`] which handles request construction, bearer
//! authentication, response envelope decoding, and transient error retry
//! on idempotent requests.

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hanashi_core::types::{Attachment, Message, MessageKind, MessagePage, PageDirection, Room};
use hanashi_core::{HanashiError, StreamEvent, CONNECTION_ID_HEADER};

use crate::sse;

/// Default server base URL, matching the server's default bind address.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8750";

/// A message as composed by the client, before the server assigns identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Echoed back in the stored message and its broadcast, so the sender
    /// can match a stream event against this in-flight send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<String>,
}

impl OutgoingMessage {
    /// A plain text message with no attachments.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
            reply_to: None,
            client_tag: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct EditBody<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ReactionBody<'a> {
    emoji: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadBody<'a> {
    up_to_message_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRoomBody<'a> {
    name: &'a str,
}

// Response envelopes. `success` is implied by the status code and skipped.

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct RoomEnvelope {
    room: Room,
}

#[derive(Debug, Deserialize)]
struct RoomListEnvelope {
    rooms: Vec<Room>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationEnvelope {
    has_more: bool,
    oldest_cursor: Option<String>,
    newest_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    messages: Vec<Message>,
    pagination: PaginationEnvelope,
}

#[derive(Debug, Deserialize)]
struct MarkReadEnvelope {
    marked: usize,
}

/// HTTP client for the chat REST API and its event stream.
///
/// Cheap to clone; all clones share one connection pool. Non-2xx
/// responses are decoded from the `{success: false, error}` body and
/// mapped back onto [`HanashiError`] by status.
#[derive(Debug, Clone)]
pub struct ChatApi {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl ChatApi {
    /// Creates a client authenticating with the given bearer token.
    pub fn new(token: impl Into<String>) -> Result<Self, HanashiError> {
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| HanashiError::Config(format!("invalid bearer token: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HanashiError::Internal(format!("failed to build HTTP client: {e}")))?;

        // The event stream must outlive any total timeout. The server
        // sends a keep-alive comment every 15 seconds, so 60 seconds
        // of silence means the link is dead and the read timeout turns
        // a half-open connection into a reconnect.
        let stream_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| HanashiError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            stream_client,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 1,
        })
    }

    /// Overrides the server base URL (config `client.server_url`, or a
    /// mock server in tests). A trailing slash is stripped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// POST /rooms
    pub async fn create_room(&self, name: &str) -> Result<Room, HanashiError> {
        let response = self
            .client
            .post(format!("{}/rooms", self.base_url))
            .json(&CreateRoomBody { name })
            .send()
            .await
            .map_err(request_error)?;
        decode::<RoomEnvelope>(response).await.map(|e| e.room)
    }

    /// GET /rooms
    pub async fn list_rooms(&self) -> Result<Vec<Room>, HanashiError> {
        let response = self
            .get_with_retry(format!("{}/rooms", self.base_url), &[])
            .await?;
        decode::<RoomListEnvelope>(response).await.map(|e| e.rooms)
    }

    /// POST /rooms/{room_id}/join
    pub async fn join_room(&self, room_id: &str) -> Result<Room, HanashiError> {
        let response = self
            .client
            .post(format!("{}/rooms/{room_id}/join", self.base_url))
            .send()
            .await
            .map_err(request_error)?;
        decode::<RoomEnvelope>(response).await.map(|e| e.room)
    }

    /// POST /rooms/{room_id}/leave
    pub async fn leave_room(&self, room_id: &str) -> Result<(), HanashiError> {
        let response = self
            .client
            .post(format!("{}/rooms/{room_id}/leave", self.base_url))
            .send()
            .await
            .map_err(request_error)?;
        decode_unit(response).await
    }

    /// GET /rooms/{room_id}/messages
    ///
    /// `cursor: None` with `Before` returns the newest page.
    pub async fn list_page(
        &self,
        room_id: &str,
        cursor: Option<&str>,
        direction: PageDirection,
        limit: u32,
    ) -> Result<MessagePage, HanashiError> {
        let mut query = vec![
            ("direction".to_string(), direction.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor".to_string(), cursor.to_string()));
        }
        let response = self
            .get_with_retry(format!("{}/rooms/{room_id}/messages", self.base_url), &query)
            .await?;
        let page = decode::<PageEnvelope>(response).await?;
        Ok(MessagePage {
            messages: page.messages,
            has_more: page.pagination.has_more,
            oldest_cursor: page.pagination.oldest_cursor,
            newest_cursor: page.pagination.newest_cursor,
        })
    }

    /// POST /rooms/{room_id}/messages
    ///
    /// `connection_id` is the caller's own stream connection; when set, the
    /// server excludes that connection from the `new_message` broadcast.
    pub async fn send_message(
        &self,
        room_id: &str,
        outgoing: &OutgoingMessage,
        connection_id: Option<&str>,
    ) -> Result<Message, HanashiError> {
        let mut request = self
            .client
            .post(format!("{}/rooms/{room_id}/messages", self.base_url))
            .json(outgoing);
        if let Some(id) = connection_id {
            request = request.header(CONNECTION_ID_HEADER, id);
        }
        let response = request.send().await.map_err(request_error)?;
        decode::<MessageEnvelope>(response).await.map(|e| e.message)
    }

    /// PATCH /rooms/{room_id}/messages/{message_id}
    pub async fn edit_message(
        &self,
        room_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message, HanashiError> {
        let response = self
            .client
            .patch(format!(
                "{}/rooms/{room_id}/messages/{message_id}",
                self.base_url
            ))
            .json(&EditBody { content })
            .send()
            .await
            .map_err(request_error)?;
        decode::<MessageEnvelope>(response).await.map(|e| e.message)
    }

    /// DELETE /rooms/{room_id}/messages/{message_id}
    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<(), HanashiError> {
        let response = self
            .client
            .delete(format!(
                "{}/rooms/{room_id}/messages/{message_id}",
                self.base_url
            ))
            .send()
            .await
            .map_err(request_error)?;
        decode_unit(response).await
    }

    /// POST /rooms/{room_id}/messages/{message_id}/reactions
    ///
    /// Toggles the caller's reaction; returns the updated message.
    pub async fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Message, HanashiError> {
        let response = self
            .client
            .post(format!(
                "{}/rooms/{room_id}/messages/{message_id}/reactions",
                self.base_url
            ))
            .json(&ReactionBody { emoji })
            .send()
            .await
            .map_err(request_error)?;
        decode::<MessageEnvelope>(response).await.map(|e| e.message)
    }

    /// POST /rooms/{room_id}/read
    ///
    /// Returns how many messages were newly marked.
    pub async fn mark_read(
        &self,
        room_id: &str,
        up_to_message_id: &str,
    ) -> Result<usize, HanashiError> {
        let response = self
            .client
            .post(format!("{}/rooms/{room_id}/read", self.base_url))
            .json(&MarkReadBody { up_to_message_id })
            .send()
            .await
            .map_err(request_error)?;
        decode::<MarkReadEnvelope>(response).await.map(|e| e.marked)
    }

    /// POST /rooms/{room_id}/typing
    ///
    /// Broadcast-only; nothing is persisted.
    pub async fn send_typing(
        &self,
        room_id: &str,
        connection_id: Option<&str>,
    ) -> Result<(), HanashiError> {
        let mut request = self
            .client
            .post(format!("{}/rooms/{room_id}/typing", self.base_url));
        if let Some(id) = connection_id {
            request = request.header(CONNECTION_ID_HEADER, id);
        }
        let response = request.send().await.map_err(request_error)?;
        decode_unit(response).await
    }

    /// GET /rooms/stream?roomId={room_id}
    ///
    /// Opens the room's SSE event stream. The first event is always
    /// `connected`, carrying the connection id for echo suppression.
    pub async fn open_stream(
        &self,
        room_id: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, HanashiError>> + Send>>, HanashiError>
    {
        let response = self
            .stream_client
            .get(format!("{}/rooms/stream", self.base_url))
            .query(&[("roomId", room_id)])
            .send()
            .await
            .map_err(|e| HanashiError::Stream {
                message: format!("failed to open event stream: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }
        Ok(sse::parse_event_stream(response))
    }

    /// GET with one retry on transient statuses (429, 500, 503).
    ///
    /// Only reads are retried; a write retried after an ambiguous failure
    /// could commit twice.
    async fn get_with_retry(
        &self,
        url: String,
        query: &[(String, String)],
    ) -> Result<reqwest::Response, HanashiError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying request after transient error");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            let response = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(request_error)?;

            let status = response.status();
            debug!(status = %status, attempt, "response received");

            if is_transient_error(status) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(HanashiError::Internal(format!(
                    "server returned {status}: {body}"
                )));
                continue;
            }

            return Ok(response);
        }

        Err(last_error
            .unwrap_or_else(|| HanashiError::Internal("request failed after retries".into())))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

fn request_error(e: reqwest::Error) -> HanashiError {
    HanashiError::Internal(format!("HTTP request failed: {e}"))
}

/// Decodes a successful JSON envelope, or maps the error body onto the
/// workspace taxonomy by status.
async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, HanashiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_from_response(status, response).await);
    }
    let body = response
        .text()
        .await
        .map_err(|e| HanashiError::Internal(format!("failed to read response body: {e}")))?;
    serde_json::from_str(&body)
        .map_err(|e| HanashiError::Internal(format!("failed to parse server response: {e}")))
}

/// Like [`decode`] but discards the success body.
async fn decode_unit(response: reqwest::Response) -> Result<(), HanashiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_from_response(status, response).await);
    }
    Ok(())
}

async fn error_from_response(status: StatusCode, response: reqwest::Response) -> HanashiError {
    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error,
        Err(_) => format!("server returned {status}: {body}"),
    };
    // The server's error strings carry the variant prefix; strip it so the
    // rebuilt variant does not render it twice.
    match status {
        StatusCode::UNAUTHORIZED => HanashiError::Unauthorized,
        StatusCode::FORBIDDEN => HanashiError::Forbidden(strip_variant(&detail, "forbidden: ")),
        StatusCode::NOT_FOUND => HanashiError::NotFound(strip_variant(&detail, "not found: ")),
        StatusCode::BAD_REQUEST => {
            HanashiError::Validation(strip_variant(&detail, "validation error: "))
        }
        _ => HanashiError::Internal(detail),
    }
}

fn strip_variant(detail: &str, prefix: &str) -> String {
    detail.strip_prefix(prefix).unwrap_or(detail).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_api(base_url: &str) -> ChatApi {
        ChatApi::new("alice-token").unwrap().with_base_url(base_url)
    }

    fn message_json(id: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "roomId": "r-1",
            "senderId": "alice",
            "type": "text",
            "content": content,
            "createdAt": "2026-01-01T00:00:00.000Z"
        })
    }

    #[tokio::test]
    async fn send_message_posts_bearer_and_connection_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rooms/r-1/messages"))
            .and(header("authorization", "Bearer alice-token"))
            .and(header("x-connection-id", "c-9"))
            .and(body_partial_json(json!({"content": "hello", "type": "text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": message_json("m-1", "hello")
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        let sent = api
            .send_message("r-1", &OutgoingMessage::text("hello"), Some("c-9"))
            .await
            .unwrap();
        assert_eq!(sent.id, "m-1");
        assert_eq!(sent.content, "hello");
    }

    #[tokio::test]
    async fn client_tag_rides_the_send_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rooms/r-1/messages"))
            .and(body_partial_json(json!({"clientTag": "tag-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": message_json("m-2", "tagged")
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        let mut outgoing = OutgoingMessage::text("tagged");
        outgoing.client_tag = Some("tag-1".into());
        let sent = api.send_message("r-1", &outgoing, None).await.unwrap();
        assert_eq!(sent.id, "m-2");
    }

    #[tokio::test]
    async fn list_page_decodes_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rooms/r-1/messages"))
            .and(query_param("direction", "before"))
            .and(query_param("limit", "2"))
            .and(query_param("cursor", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "messages": [message_json("m-1", "a"), message_json("m-2", "b")],
                "pagination": {"hasMore": true, "oldestCursor": "older", "newestCursor": "newer"}
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        let page = api
            .list_page("r-1", Some("abc"), PageDirection::Before, 2)
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.oldest_cursor.as_deref(), Some("older"));
        assert_eq!(page.newest_cursor.as_deref(), Some("newer"));
    }

    #[tokio::test]
    async fn list_page_retries_once_on_503() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rooms/r-1/messages"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "success": false,
                "error": "overloaded"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rooms/r-1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "messages": [],
                "pagination": {"hasMore": false, "oldestCursor": null, "newestCursor": null}
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        let page = api
            .list_page("r-1", None, PageDirection::Before, 30)
            .await
            .unwrap();
        assert!(page.messages.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn error_bodies_map_back_to_the_taxonomy() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rooms/r-1/messages/m-1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "error": "forbidden: only the sender may edit"
            })))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/rooms/r-1/messages/m-404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "not found: message m-404"
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());

        let err = api.edit_message("r-1", "m-1", "nope").await.unwrap_err();
        match err {
            HanashiError::Forbidden(detail) => assert!(detail.contains("only the sender")),
            other => panic!("expected Forbidden, got {other:?}"),
        }

        let err = api.delete_message("r-1", "m-404").await.unwrap_err();
        assert!(matches!(err, HanashiError::NotFound(_)));
    }

    #[tokio::test]
    async fn unauthorized_discards_the_body_detail() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rooms"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "error": "unauthorized"
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        let err = api.list_rooms().await.unwrap_err();
        assert!(matches!(err, HanashiError::Unauthorized));
    }

    #[tokio::test]
    async fn open_stream_rejection_maps_to_the_taxonomy() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rooms/stream"))
            .and(query_param("roomId", "r-9"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "error": "forbidden: alice is not a participant of room r-9"
            })))
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        let err = api.open_stream("r-9").await.err().unwrap();
        assert!(matches!(err, HanashiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn mark_read_returns_the_marked_count() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rooms/r-1/read"))
            .and(body_partial_json(json!({"upToMessageId": "m-5"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "marked": 3})),
            )
            .mount(&server)
            .await;

        let api = test_api(&server.uri());
        assert_eq!(api.mark_read("r-1", "m-5").await.unwrap(), 3);
    }
}
