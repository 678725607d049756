//! Messaging gateway.
//!
//! The gateway drives each connection through `Connecting -> Open -> Closed`:
//!
//! - [`Gateway::connect`] registers a freshly accepted connection.
//! - [`Gateway::handle_text`] processes one inbound frame. Callers await it
//!   before reading the next frame, which keeps per-connection ordering.
//! - [`Gateway::disconnect`] consumes the handle, unregisters it and
//!   announces the departure. Taking the handle by value makes cleanup a
//!   one-shot step.

use parley_protocol::{codec, EnvelopeType, Inbound, ProtocolError, PublicUser, ResponseEnvelope};
use parley_transport::TransportError;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, TokenAuthenticator};
use crate::connection::ConnectionHandle;
use crate::registry::{BroadcastReport, ConnectionRegistry};
use crate::store::UserStore;

/// Reply text for frames that are not a valid envelope.
pub const MALFORMED_MESSAGE: &str = "Invalid message format";

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum Outcome {
    /// The frame was echoed back to the sender.
    Echoed(EnvelopeType),
    /// The connection is now bound under this identity key.
    Authenticated(String),
    /// Authentication failed; an error envelope was sent.
    AuthRejected(AuthError),
    /// The frame was not a valid envelope; an error envelope was sent.
    Malformed(ProtocolError),
}

/// Connection lifecycle and message dispatch.
pub struct Gateway {
    registry: Arc<dyn ConnectionRegistry>,
    authenticator: Arc<dyn TokenAuthenticator>,
    users: Arc<dyn UserStore>,
}

impl Gateway {
    /// Create a gateway over a registry and the two identity collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        authenticator: Arc<dyn TokenAuthenticator>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            registry,
            authenticator,
            users,
        }
    }

    /// The registry this gateway drives.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    /// Register an accepted connection.
    pub fn connect(&self, connection: ConnectionHandle) -> ConnectionHandle {
        self.registry.add(connection.clone());
        info!(connection = %connection.id(), peer = %connection.peer(), "Connection opened");
        connection
    }

    /// Process one inbound text frame.
    ///
    /// Protocol and authentication failures are answered with an error
    /// envelope and reported in the [`Outcome`]; they never end the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error only if the reply could not be written.
    pub async fn handle_text(
        &self,
        connection: &ConnectionHandle,
        text: &str,
    ) -> Result<Outcome, TransportError> {
        let inbound = match codec::decode_inbound(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(connection = %connection.id(), error = %e, "Malformed message");
                self.reply(connection, &ResponseEnvelope::<Value>::error(MALFORMED_MESSAGE))?;
                return Ok(Outcome::Malformed(e));
            }
        };

        match inbound {
            Inbound::Auth(request) => {
                match self.log_in(connection, request.token.as_deref()).await {
                    Ok(user) => {
                        let identity = user.uid.clone();
                        self.reply(connection, &ResponseEnvelope::success(user))?;
                        Ok(Outcome::Authenticated(identity))
                    }
                    Err(e) => {
                        self.reply(connection, &ResponseEnvelope::<Value>::error(e.to_string()))?;
                        Ok(Outcome::AuthRejected(e))
                    }
                }
            }
            // Header announcements currently get the same echo as any
            // other type.
            Inbound::WsHeaders(envelope) => {
                debug!(connection = %connection.id(), "Received ws_headers message");
                self.registry.send_to(connection, envelope.raw())?;
                Ok(Outcome::Echoed(EnvelopeType::WsHeaders))
            }
            Inbound::Relay(envelope) => {
                debug!(connection = %connection.id(), kind = %envelope.kind(), "Received message");
                self.registry.send_to(connection, envelope.raw())?;
                Ok(Outcome::Echoed(EnvelopeType::Relay))
            }
        }
    }

    /// Authenticate a connection with a bearer token and bind it.
    ///
    /// The identity store session is scoped to the lookup and released on
    /// every path, including early failures.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] whose display text is the client-facing
    /// message.
    pub async fn log_in(
        &self,
        connection: &ConnectionHandle,
        token: Option<&str>,
    ) -> Result<PublicUser, AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.authenticator.authenticate(token).map_err(|e| {
            debug!(connection = %connection.id(), error = %e, "Token verification failed");
            AuthError::InvalidToken(e)
        })?;

        let claim = claims.identity().ok_or(AuthError::InvalidPayload)?;

        let user = {
            let session = self.users.session().await.map_err(|e| {
                error!(connection = %connection.id(), error = %e, "Identity store unavailable");
                e
            })?;
            session.find_user_by_username(claim.as_str()).await?
        }
        .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        let profile = user.public_profile().ok_or(AuthError::NoIdentifier)?;

        if let Some(replaced) = self.registry.bind(&profile.uid, connection.id())? {
            debug!(identity = %profile.uid, replaced = %replaced, "Previous connection unbound");
        }

        info!(
            connection = %connection.id(),
            identity = %profile.uid,
            username = %profile.username,
            "Connection authenticated"
        );
        Ok(profile)
    }

    /// Unregister a connection and tell everyone else it left.
    pub fn disconnect(&self, connection: ConnectionHandle) -> BroadcastReport {
        self.registry.remove(connection.id());
        info!(connection = %connection.id(), peer = %connection.peer(), "Connection closed");

        let report = self
            .registry
            .broadcast(&format!("{} left the chat", connection.peer()));
        if !report.failed.is_empty() {
            warn!(
                connection = %connection.id(),
                failed = report.failed.len(),
                "Departure notice not delivered everywhere"
            );
        }
        report
    }

    fn reply<T: Serialize>(
        &self,
        connection: &ConnectionHandle,
        response: &ResponseEnvelope<T>,
    ) -> Result<(), TransportError> {
        match codec::encode(response) {
            Ok(text) => self.registry.send_to(connection, &text),
            Err(e) => {
                error!(connection = %connection.id(), error = %e, "Failed to encode response");
                Ok(())
            }
        }
    }
}
