//! # parley-protocol
//!
//! Wire definitions for the Parley chat gateway.
//!
//! Every unit of application data is a JSON text frame. Inbound frames are
//! [`Envelope`]s carrying a `type` discriminator; replies produced by the
//! gateway are [`ResponseEnvelope`]s with the fixed
//! `{result, error, message, data}` shape.
//!
//! ## Envelope Types
//!
//! - `auth` - Authentication request carrying a bearer `token`
//! - `ws_headers` - Client header announcement (relayed like any message)
//! - anything else - Relay message, echoed back to the sender
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, Inbound};
//!
//! let inbound = codec::decode_inbound(r#"{"type":"auth","token":"abc"}"#).unwrap();
//! assert!(matches!(inbound, Inbound::Auth(_)));
//! ```

pub mod codec;
pub mod envelope;
pub mod response;

pub use codec::{decode, decode_inbound, encode, ProtocolError};
pub use envelope::{AuthRequest, Envelope, EnvelopeType, Inbound, AUTH_TYPE, WS_HEADERS_TYPE};
pub use response::{PublicUser, ResponseEnvelope};
