//! Connection handles.

use parley_transport::{ConnectionId, MessageSink, TransportError};
use std::fmt;
use std::sync::Arc;

/// A cheap, cloneable handle to one live duplex connection.
///
/// The handle carries the runtime identifier, a descriptor of the remote
/// peer (used in logs and departure notices) and the connection's write half.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: String,
    sink: Arc<dyn MessageSink>,
}

impl ConnectionHandle {
    /// Create a handle with a freshly generated ID.
    #[must_use]
    pub fn new(peer: impl Into<String>, sink: impl MessageSink + 'static) -> Self {
        Self::with_id(ConnectionId::generate(), peer, sink)
    }

    /// Create a handle with a specific ID.
    #[must_use]
    pub fn with_id(
        id: ConnectionId,
        peer: impl Into<String>,
        sink: impl MessageSink + 'static,
    ) -> Self {
        Self {
            id,
            peer: peer.into(),
            sink: Arc::new(sink),
        }
    }

    /// The connection's unique identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Descriptor of the remote peer.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue a text frame for this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying channel rejects the write.
    pub fn send_text(&self, text: impl Into<Arc<str>>) -> Result<(), TransportError> {
        self.sink.send_text(text.into())
    }

    /// Check if the connection still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sink.is_open()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}
