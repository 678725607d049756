//! # parley-transport
//!
//! Connection plumbing for the Parley chat gateway.
//!
//! Every live connection is represented by a [`ConnectionId`] and a
//! [`MessageSink`]. Writes to a sink never block: they are queued to a
//! per-connection writer task that owns the socket's write half.
//!
//! ```rust,ignore
//! use parley_transport::{websocket, ConnectionId};
//!
//! async fn handle(socket: axum::extract::ws::WebSocket) {
//!     let id = ConnectionId::generate();
//!     let (sink, mut reader, writer) = websocket::split(socket, &id);
//!     while let Ok(Some(text)) = reader.recv().await {
//!         // Process text
//!     }
//! }
//! ```

pub mod channel;
pub mod traits;
pub mod websocket;

pub use channel::ChannelSink;
pub use traits::{ConnectionId, MessageSink, TransportError};
