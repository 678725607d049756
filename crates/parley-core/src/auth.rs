//! Bearer token authentication.
//!
//! A [`TokenAuthenticator`] turns a raw token into [`TokenClaims`]; the
//! gateway then extracts an [`IdentityClaim`] and resolves it against the
//! identity store.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::registry::RegistryError;
use crate::store::StoreError;

/// Claim keys searched for the user identity, in preference order.
pub const IDENTITY_CLAIM_KEYS: [&str; 3] = ["sub", "username", "user"];

/// Default access token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Token verification and issuance errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token's `exp` is in the past.
    #[error("Token expired")]
    Expired,

    /// The signature does not match.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token could not be parsed or is missing required claims.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// A token could not be signed.
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Authentication failures.
///
/// The display text of each variant is exactly what the client receives in
/// the error response envelope.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token, or an empty one.
    #[error("Invalid token")]
    MissingToken,

    /// The token failed verification.
    #[error("Invalid token")]
    InvalidToken(#[source] TokenError),

    /// The token carries no usable identity claim.
    #[error("Invalid token payload")]
    InvalidPayload,

    /// No user matches the claim.
    #[error("Invalid token or user not found")]
    UserNotFound,

    /// The user exists but is deactivated.
    #[error("Inactive user")]
    InactiveUser,

    /// The user record has no field to derive an identity key from.
    #[error("User has no usable identifier")]
    NoIdentifier,

    /// The identity store could not be reached.
    #[error("DB server error")]
    Store(#[from] StoreError),

    /// The connection left the registry before it could be bound.
    #[error("Connection is not registered")]
    Registry(#[from] RegistryError),
}

/// The identity asserted by a verified token, before store lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityClaim(String);

impl IdentityClaim {
    /// Get the claim as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The decoded payload of a verified token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims(Map<String, Value>);

impl TokenClaims {
    /// Wrap a decoded payload.
    #[must_use]
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Look up a raw claim.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Extract the identity claim.
    ///
    /// Keys are tried in [`IDENTITY_CLAIM_KEYS`] order. A claim may be a bare
    /// non-empty string, or an object searched with the same key order.
    #[must_use]
    pub fn identity(&self) -> Option<IdentityClaim> {
        IDENTITY_CLAIM_KEYS
            .iter()
            .find_map(|key| match self.0.get(*key)? {
                Value::String(s) => non_empty(s),
                Value::Object(nested) => IDENTITY_CLAIM_KEYS.iter().find_map(|inner| {
                    nested.get(*inner).and_then(Value::as_str).and_then(non_empty)
                }),
                _ => None,
            })
            .map(IdentityClaim)
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

/// Verifies bearer tokens.
pub trait TokenAuthenticator: Send + Sync {
    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, expired or has an invalid
    /// signature.
    fn authenticate(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// HS256 JSON Web Token authenticator.
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    /// Create an authenticator for a shared secret.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    /// Issue a token for a subject, expiring after the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        let mut claims = Map::new();
        claims.insert("sub".into(), Value::from(subject));
        self.issue_claims(claims)
    }

    /// Issue a token for an arbitrary payload.
    ///
    /// `exp` defaults to now plus the configured lifetime, `iat` to now.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_claims(&self, mut claims: Map<String, Value>) -> Result<String, TokenError> {
        let now = jsonwebtoken::get_current_timestamp();
        claims
            .entry("exp")
            .or_insert_with(|| Value::from(now + self.ttl.as_secs()));
        claims.entry("iat").or_insert_with(|| Value::from(now));

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}

impl TokenAuthenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                TokenError::from(e)
            })?;
        Ok(TokenClaims::new(data.claims))
    }
}
