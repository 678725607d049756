//! Inbound envelope types.
//!
//! An envelope is a JSON object with a string `type` field and an arbitrary
//! payload. The gateway classifies envelopes into [`Inbound`] variants and
//! dispatches on those, never on raw strings.

use serde_json::{Map, Value};

/// Reserved type of an authentication request.
pub const AUTH_TYPE: &str = "auth";

/// Type used by clients that announce their headers after connecting.
pub const WS_HEADERS_TYPE: &str = "ws_headers";

/// Envelope type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    /// Authentication request.
    Auth,
    /// Header announcement.
    WsHeaders,
    /// Any other type.
    Relay,
}

impl EnvelopeType {
    /// Classify a `type` tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            AUTH_TYPE => EnvelopeType::Auth,
            WS_HEADERS_TYPE => EnvelopeType::WsHeaders,
            _ => EnvelopeType::Relay,
        }
    }
}

/// A decoded inbound envelope.
///
/// The raw text is retained so relay messages can be echoed back
/// verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: String,
    fields: Map<String, Value>,
    raw: String,
}

impl Envelope {
    pub(crate) fn new(kind: String, fields: Map<String, Value>, raw: String) -> Self {
        Self { kind, fields, raw }
    }

    /// The `type` tag as sent by the client.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The classified envelope type.
    #[must_use]
    pub fn envelope_type(&self) -> EnvelopeType {
        EnvelopeType::from_tag(&self.kind)
    }

    /// Look up a payload field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The exact text this envelope was decoded from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Convert into a dispatchable message.
    #[must_use]
    pub fn into_inbound(self) -> Inbound {
        match self.envelope_type() {
            EnvelopeType::Auth => Inbound::Auth(AuthRequest {
                token: self
                    .fields
                    .get("token")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            }),
            EnvelopeType::WsHeaders => Inbound::WsHeaders(self),
            EnvelopeType::Relay => Inbound::Relay(self),
        }
    }
}

/// An authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Bearer token. `None` when the field is absent or not a string.
    pub token: Option<String>,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{"type":"auth","token":...}`
    Auth(AuthRequest),
    /// `{"type":"ws_headers",...}`
    WsHeaders(Envelope),
    /// Any other type.
    Relay(Envelope),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_type_from_tag() {
        assert_eq!(EnvelopeType::from_tag("auth"), EnvelopeType::Auth);
        assert_eq!(EnvelopeType::from_tag("ws_headers"), EnvelopeType::WsHeaders);
        assert_eq!(EnvelopeType::from_tag("chat"), EnvelopeType::Relay);
        // Tags are case sensitive
        assert_eq!(EnvelopeType::from_tag("AUTH"), EnvelopeType::Relay);
    }

    #[test]
    fn test_auth_token_must_be_string() {
        let mut fields = Map::new();
        fields.insert("token".into(), Value::from(42));
        let envelope = Envelope::new("auth".into(), fields, String::new());

        assert_eq!(
            envelope.into_inbound(),
            Inbound::Auth(AuthRequest { token: None })
        );
    }
}
