//! Outbound response envelopes.

use serde::{Deserialize, Serialize};

/// The standard reply shape: `{result, error, message, data}`.
///
/// `result` and `error` are always complements; the only way to build a
/// response is through [`ResponseEnvelope::success`] or
/// [`ResponseEnvelope::error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T = serde_json::Value> {
    result: bool,
    error: bool,
    message: String,
    data: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    /// A successful response carrying `data` and an empty message.
    #[must_use]
    pub fn success(data: T) -> Self {
        Self::success_with_message("", data)
    }

    /// A successful response with a human-readable message.
    #[must_use]
    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            result: true,
            error: false,
            message: message.into(),
            data: Some(data),
        }
    }

    /// An error response. `data` is always null.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: false,
            error: true,
            message: message.into(),
            data: None,
        }
    }

    /// Whether this is a success response.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result
    }

    /// Whether this is an error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }
}

/// Public projection of an authenticated user.
///
/// This is the only user shape that ever goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    /// Identity key the connection is bound under.
    pub uid: String,
    /// Login name.
    pub username: String,
    /// Contact email, if known.
    pub email: Option<String>,
}
