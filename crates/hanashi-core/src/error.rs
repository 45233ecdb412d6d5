// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Hanashi chat service.

use thiserror::Error;

/// The primary error type used across the Hanashi workspace.
///
/// The first four variants form the caller-facing taxonomy the gateway
/// maps to HTTP statuses; the rest describe internal failure domains.
#[derive(Debug, Error)]
pub enum HanashiError {
    /// No valid caller identity (missing or unknown credentials).
    #[error("unauthorized")]
    Unauthorized,

    /// Valid caller, insufficient rights (e.g. editing another user's message).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A referenced room or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input: bad cursor, empty content, out-of-range limit.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Event stream errors (connection failure, malformed frame).
    #[error("stream error: {message}")]
    Stream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HanashiError {
    /// Shorthand for a storage error wrapping any boxed source.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Shorthand for a stream error with no underlying source.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_render() {
        assert_eq!(HanashiError::Unauthorized.to_string(), "unauthorized");
        assert_eq!(
            HanashiError::Forbidden("not the sender".into()).to_string(),
            "forbidden: not the sender"
        );
        assert_eq!(
            HanashiError::NotFound("room r-1".into()).to_string(),
            "not found: room r-1"
        );
        assert_eq!(
            HanashiError::Validation("empty content".into()).to_string(),
            "validation error: empty content"
        );
    }

    #[test]
    fn storage_helper_wraps_source() {
        let err = HanashiError::storage(std::io::Error::other("disk gone"));
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn stream_helper_has_no_source() {
        let err = HanashiError::stream("connection reset");
        match err {
            HanashiError::Stream { message, source } => {
                assert_eq!(message, "connection reset");
                assert!(source.is_none());
            }
            other => panic!("expected Stream, got {other:?}"),
        }
    }
}
