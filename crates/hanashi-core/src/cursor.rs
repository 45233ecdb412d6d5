// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque pagination cursors.
//!
//! A cursor pins a position in a room's history as the `(created_at, id)`
//! pair of one message, encoded as URL-safe base64 so it travels in query
//! strings without escaping. Because paging compares against the full pair
//! (strict tuple comparison), a cursor never skips or duplicates a message
//! that existed when the cursor was issued, regardless of concurrent
//! inserts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::HanashiError;
use crate::types::Message;

/// Separator between the timestamp and id halves of the decoded token.
/// RFC 3339 timestamps and uuid ids never contain `|`.
const SEP: char = '|';

/// A decoded pagination cursor: one message's position in time-order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: String,
    pub id: String,
}

impl Cursor {
    /// Cursor pointing at the given message.
    pub fn for_message(msg: &Message) -> Self {
        Self {
            created_at: msg.created_at.clone(),
            id: msg.id.clone(),
        }
    }

    /// Encode into the opaque wire token.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}{SEP}{}", self.created_at, self.id))
    }

    /// Decode a wire token. Malformed tokens are a validation error so the
    /// gateway reports them as a bad request rather than a server fault.
    pub fn decode(token: &str) -> Result<Self, HanashiError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| HanashiError::Validation(format!("malformed cursor `{token}`")))?;
        let decoded = String::from_utf8(bytes)
            .map_err(|_| HanashiError::Validation(format!("malformed cursor `{token}`")))?;
        let (created_at, id) = decoded
            .split_once(SEP)
            .ok_or_else(|| HanashiError::Validation(format!("malformed cursor `{token}`")))?;
        if created_at.is_empty() || id.is_empty() {
            return Err(HanashiError::Validation(format!(
                "malformed cursor `{token}`"
            )));
        }
        Ok(Self {
            created_at: created_at.to_string(),
            id: id.to_string(),
        })
    }
}
