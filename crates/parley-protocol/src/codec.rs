//! JSON codec for Parley envelopes.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::{Envelope, Inbound};
use crate::response::ResponseEnvelope;

/// Maximum envelope size (16 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    EnvelopeTooLarge(usize),

    /// Text is not valid JSON.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON value is not an object.
    #[error("Envelope must be a JSON object")]
    NotAnObject,

    /// Object has no string `type` field.
    #[error("Envelope is missing a string `type` field")]
    MissingType,
}

/// Decode an envelope from a text frame.
///
/// # Errors
///
/// Returns an error if the text is too large, not JSON, not an object, or
/// lacks a string `type`.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    if text.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::EnvelopeTooLarge(text.len()));
    }

    let mut fields = match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => fields,
        _ => return Err(ProtocolError::NotAnObject),
    };

    let kind = match fields.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(ProtocolError::MissingType),
    };

    Ok(Envelope::new(kind, fields, text.to_owned()))
}

/// Decode and classify a text frame.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    decode(text).map(Envelope::into_inbound)
}

/// Encode a response envelope as a JSON text frame.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode<T: Serialize>(response: &ResponseEnvelope<T>) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(response)?;

    if text.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::EnvelopeTooLarge(text.len()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AuthRequest, EnvelopeType};

    #[test]
    fn test_decode_relay_keeps_raw_text() {
        let text = r#"{"type":"chat","text":"hi"}"#;
        let envelope = decode(text).unwrap();

        assert_eq!(envelope.kind(), "chat");
        assert_eq!(envelope.envelope_type(), EnvelopeType::Relay);
        assert_eq!(envelope.field("text").and_then(Value::as_str), Some("hi"));
        assert_eq!(envelope.raw(), text);
    }

    #[test]
    fn test_decode_auth_request() {
        let inbound = decode_inbound(r#"{"type":"auth","token":"abc.def.ghi"}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Auth(AuthRequest {
                token: Some("abc.def.ghi".into())
            })
        );

        let inbound = decode_inbound(r#"{"type":"auth"}"#).unwrap();
        assert_eq!(inbound, Inbound::Auth(AuthRequest { token: None }));
    }

    #[test]
    fn test_decode_ws_headers() {
        let inbound =
            decode_inbound(r#"{"type":"ws_headers","headers":{"x-client":"web"}}"#).unwrap();
        assert!(matches!(inbound, Inbound::WsHeaders(_)));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode("[1, 2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(decode("\"chat\""), Err(ProtocolError::NotAnObject)));
        assert!(matches!(
            decode(r#"{"text":"hi"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            decode(r#"{"type":7}"#),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_decode_too_large() {
        let text = format!(r#"{{"type":"chat","text":"{}"}}"#, "a".repeat(MAX_ENVELOPE_SIZE));
        assert!(matches!(
            decode(&text),
            Err(ProtocolError::EnvelopeTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_error_response() {
        let text = encode(&ResponseEnvelope::<Value>::error("DB server error")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["result"], false);
        assert_eq!(value["error"], true);
        assert_eq!(value["message"], "DB server error");
        assert!(value["data"].is_null());
    }
}
