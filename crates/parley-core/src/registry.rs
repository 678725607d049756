//! Connection registry for Parley.
//!
//! The registry owns the live connection set and the identity bindings.
//! Every mutation and every broadcast enumeration happens under one lock, so
//! a broadcast always sees a consistent snapshot and a binding can never
//! outlive its connection. The lock is never held across an `.await`: sinks
//! only queue frames.

use crate::connection::ConnectionHandle;
use parking_lot::Mutex;
use parley_transport::{ConnectionId, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The connection is not in the live set.
    #[error("Connection not registered: {0}")]
    UnknownConnection(ConnectionId),
}

/// Backend-agnostic registry interface.
///
/// The gateway only talks to this trait. An implementation that fans out
/// through a shared pub/sub backend can replace [`LocalRegistry`] without
/// touching the gateway.
pub trait ConnectionRegistry: Send + Sync {
    /// Insert a connection into the live set.
    fn add(&self, connection: ConnectionHandle);

    /// Remove a connection and its identity binding, if any.
    ///
    /// Removing an absent connection is a no-op and returns `None`.
    fn remove(&self, id: &ConnectionId) -> Option<ConnectionHandle>;

    /// Bind an identity key to a live connection.
    ///
    /// A previous binding for the same key is replaced; its connection stays
    /// open and registered. Returns the connection that lost the binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not registered.
    fn bind(
        &self,
        identity_key: &str,
        id: &ConnectionId,
    ) -> Result<Option<ConnectionId>, RegistryError>;

    /// Write a message to a single connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection's channel rejects the write.
    fn send_to(&self, connection: &ConnectionHandle, message: &str)
        -> Result<(), TransportError>;

    /// Write a message to every live connection.
    fn broadcast(&self, message: &str) -> BroadcastReport;

    /// Find the connection bound to an identity key.
    fn lookup_by_identity(&self, identity_key: &str) -> Option<ConnectionHandle>;

    /// The identity key a connection is bound under.
    fn identity_of(&self, id: &ConnectionId) -> Option<String>;

    /// Check if a connection is live.
    fn contains(&self, id: &ConnectionId) -> bool;

    /// Number of live connections.
    fn len(&self) -> usize;

    /// Check if there are no live connections.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registry statistics.
    fn stats(&self) -> RegistryStats;
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of connections the message was queued for.
    pub delivered: usize,
    /// Connections whose write failed.
    pub failed: Vec<ConnectionId>,
    /// Failed connections that were removed because their peer is gone.
    pub pruned: Vec<ConnectionId>,
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Number of identity bindings.
    pub bound_count: usize,
}

/// A live connection and the identity it is bound under.
struct Entry {
    handle: ConnectionHandle,
    identity: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    /// Live connections indexed by ID.
    connections: HashMap<ConnectionId, Entry>,
    /// Identity key -> connection ID.
    bindings: HashMap<String, ConnectionId>,
}

impl RegistryState {
    fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let entry = self.connections.remove(id)?;
        if let Some(key) = entry.identity {
            // The key may already point at a newer connection.
            if self.bindings.get(&key) == Some(id) {
                self.bindings.remove(&key);
            }
        }
        Some(entry.handle)
    }
}

/// The in-process connection registry.
pub struct LocalRegistry {
    state: Mutex<RegistryState>,
}

impl LocalRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// IDs of all live connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.state.lock().connections.keys().cloned().collect()
    }
}

impl Default for LocalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry for LocalRegistry {
    fn add(&self, connection: ConnectionHandle) {
        let mut state = self.state.lock();
        let id = connection.id().clone();
        debug!(connection = %id, peer = %connection.peer(), "Connection registered");
        state.connections.entry(id).or_insert(Entry {
            handle: connection,
            identity: None,
        });
    }

    fn remove(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let removed = self.state.lock().remove(id);
        if removed.is_some() {
            debug!(connection = %id, "Connection unregistered");
        }
        removed
    }

    fn bind(
        &self,
        identity_key: &str,
        id: &ConnectionId,
    ) -> Result<Option<ConnectionId>, RegistryError> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let entry = state
            .connections
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.clone()))?;

        // A connection is bound under at most one key.
        if let Some(old_key) = entry.identity.replace(identity_key.to_string()) {
            if old_key != identity_key && state.bindings.get(&old_key) == Some(id) {
                state.bindings.remove(&old_key);
            }
        }

        let previous = state
            .bindings
            .insert(identity_key.to_string(), id.clone())
            .filter(|prev| prev != id);

        if let Some(prev) = &previous {
            if let Some(prev_entry) = state.connections.get_mut(prev) {
                prev_entry.identity = None;
            }
            info!(
                identity = %identity_key,
                connection = %id,
                replaced = %prev,
                "Identity rebound to new connection"
            );
        } else {
            debug!(identity = %identity_key, connection = %id, "Identity bound");
        }

        Ok(previous)
    }

    fn send_to(
        &self,
        connection: &ConnectionHandle,
        message: &str,
    ) -> Result<(), TransportError> {
        trace!(connection = %connection.id(), "Unicast");
        connection.send_text(message)
    }

    fn broadcast(&self, message: &str) -> BroadcastReport {
        let payload: Arc<str> = Arc::from(message);
        let mut report = BroadcastReport::default();

        let mut state = self.state.lock();

        for (id, entry) in &state.connections {
            match entry.handle.send_text(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(connection = %id, error = %e, "Broadcast write failed");
                    if e.is_peer_gone() {
                        report.pruned.push(id.clone());
                    }
                    report.failed.push(id.clone());
                }
            }
        }

        for id in &report.pruned {
            state.remove(id);
            debug!(connection = %id, "Pruned closed connection");
        }

        trace!(
            recipients = report.delivered,
            failed = report.failed.len(),
            "Broadcast"
        );
        report
    }

    fn lookup_by_identity(&self, identity_key: &str) -> Option<ConnectionHandle> {
        let state = self.state.lock();
        let id = state.bindings.get(identity_key)?;
        state.connections.get(id).map(|e| e.handle.clone())
    }

    fn identity_of(&self, id: &ConnectionId) -> Option<String> {
        self.state
            .lock()
            .connections
            .get(id)
            .and_then(|e| e.identity.clone())
    }

    fn contains(&self, id: &ConnectionId) -> bool {
        self.state.lock().connections.contains_key(id)
    }

    fn len(&self) -> usize {
        self.state.lock().connections.len()
    }

    fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            connection_count: state.connections.len(),
            bound_count: state.bindings.len(),
        }
    }
}
