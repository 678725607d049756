//! # parley-core
//!
//! Connection management and message routing for the Parley chat gateway.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - The live connection set and identity bindings
//! - **Auth** - Bearer token verification and identity claim extraction
//! - **Store** - Scoped identity store sessions
//! - **Gateway** - Per-connection lifecycle and message dispatch
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Gateway   │────▶│  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                     ┌──────┴──────┐
//!                     ▼             ▼
//!              ┌─────────────┐ ┌─────────────┐
//!              │    Auth     │ │    Store    │
//!              └─────────────┘ └─────────────┘
//! ```

pub mod auth;
pub mod connection;
pub mod gateway;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthError, IdentityClaim, JwtAuthenticator, TokenAuthenticator, TokenClaims, TokenError};
pub use connection::ConnectionHandle;
pub use gateway::{Gateway, Outcome};
pub use registry::{BroadcastReport, ConnectionRegistry, LocalRegistry, RegistryError, RegistryStats};
pub use store::{MemoryUserStore, StoreError, StoreSession, UserRecord, UserStore};
