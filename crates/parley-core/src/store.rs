//! Identity store.
//!
//! The gateway resolves identity claims through a [`UserStore`]. Every
//! lookup runs inside a [`StoreSession`] acquired for that one request; the
//! session is released when the box is dropped, on every exit path.

use async_trait::async_trait;
use dashmap::DashMap;
use parley_protocol::PublicUser;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Identity store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached.
    #[error("Identity store unavailable: {0}")]
    Unavailable(String),

    /// A query failed.
    #[error("Identity store query failed: {0}")]
    Query(String),
}

/// A user as held by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// External identifier.
    #[serde(default)]
    pub uid: Option<String>,
    /// Internal numeric ID.
    #[serde(default)]
    pub id: Option<i64>,
    /// Login name.
    pub username: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Password hash. Never serialized.
    #[serde(default, skip_serializing)]
    pub hashed_password: Option<String>,
    /// Whether the account may log in.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UserRecord {
    /// Create an active user with only a username.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            uid: None,
            id: None,
            username: username.into(),
            email: None,
            hashed_password: None,
            is_active: true,
        }
    }

    /// Set the external identifier.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Set the internal ID.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Derive the identity key: external identifier, then internal ID, then
    /// username. Empty values are skipped.
    #[must_use]
    pub fn identity_key(&self) -> Option<String> {
        self.uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .map(str::to_owned)
            .or_else(|| self.id.map(|id| id.to_string()))
            .or_else(|| (!self.username.is_empty()).then(|| self.username.clone()))
    }

    /// The projection sent to clients, or `None` without an identity key.
    #[must_use]
    pub fn public_profile(&self) -> Option<PublicUser> {
        Some(PublicUser {
            uid: self.identity_key()?,
            username: self.username.clone(),
            email: self.email.clone(),
        })
    }
}

/// A source of identity store sessions.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Acquire a session. It is released when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn session(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// A scoped identity store session.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Look up a user by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn find_user_by_username(&self, username: &str)
        -> Result<Option<UserRecord>, StoreError>;
}

/// An in-memory identity store.
pub struct MemoryUserStore {
    users: Arc<DashMap<String, UserRecord>>,
    open_sessions: Arc<AtomicUsize>,
    available: AtomicBool,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            open_sessions: Arc::new(AtomicUsize::new(0)),
            available: AtomicBool::new(true),
        }
    }

    /// Create a store seeded with users.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let store = Self::new();
        for user in users {
            store.insert(user);
        }
        store
    }

    /// Insert or replace a user, keyed by username.
    pub fn insert(&self, user: UserRecord) {
        debug!(username = %user.username, "Storing user");
        self.users.insert(user.username.clone(), user);
    }

    /// Remove a user.
    pub fn remove(&self, username: &str) -> Option<UserRecord> {
        self.users.remove(username).map(|(_, user)| user)
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if the store holds no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Simulate the store going offline or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of sessions currently acquired.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        trace!("Store session acquired");
        Ok(Box::new(MemorySession {
            users: Arc::clone(&self.users),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }
}

struct MemorySession {
    users: Arc<DashMap<String, UserRecord>>,
    open_sessions: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(username).map(|entry| entry.value().clone()))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        trace!("Store session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_preference() {
        let user = UserRecord::new("alice").with_id(7).with_uid("ext-1");
        assert_eq!(user.identity_key().as_deref(), Some("ext-1"));

        let user = UserRecord::new("alice").with_id(7);
        assert_eq!(user.identity_key().as_deref(), Some("7"));

        let user = UserRecord::new("alice").with_uid("");
        assert_eq!(user.identity_key().as_deref(), Some("alice"));

        assert_eq!(UserRecord::new("").identity_key(), None);
        assert_eq!(UserRecord::new("").public_profile(), None);
    }

    #[test]
    fn test_record_never_serializes_password() {
        let mut user = UserRecord::new("alice").with_email("alice@example.com");
        user.hashed_password = Some("$pbkdf2-sha256$secret".into());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("hashed_password"));
        assert!(!json.contains("secret"));
    }

    #[tokio::test]
    async fn test_memory_store_lookup() {
        let store = MemoryUserStore::with_users([UserRecord::new("alice").with_id(1)]);

        let session = store.session().await.unwrap();
        let found = session.find_user_by_username("alice").await.unwrap();
        assert_eq!(found.and_then(|u| u.id), Some(1));
        assert!(session
            .find_user_by_username("mallory")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_session_released_on_drop() {
        let store = MemoryUserStore::new();

        let session = store.session().await.unwrap();
        assert_eq!(store.open_sessions(), 1);

        drop(session);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryUserStore::new();
        store.set_available(false);

        assert!(matches!(
            store.session().await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.open_sessions(), 0);
    }
}
