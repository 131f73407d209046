//! Token stores
//!
//! Every store issues, validates, and revokes opaque bearer credentials
//! through the same [`TokenStore`] contract, so stores compose as wrappers:
//!
//! - [`DatabaseTokenStore`]: random id, row keyed by `sha256(id)`, revocable
//! - [`JsonTokenStore`]: the credential *is* the claims, nothing server-side
//! - [`EncryptedTokenStore`]: AES-CTR over a delegate's id (`iv.ciphertext`)
//! - [`HmacTokenStore`]: HMAC-SHA256 tag over a delegate's id (`id.tag`)
//! - [`OAuth2TokenStore`]: validation delegated to an introspection endpoint
//!
//! `read` never fails on malformed or tampered input; those resolve to
//! `Ok(None)`. Errors are reserved for infrastructure (database, remote
//! authority) and for operations a store does not support.

mod database;
mod encrypted;
mod hmac;
mod json;
mod key;
mod oauth2;
mod random;
pub mod tls;

pub use database::{DatabaseTokenStore, ExpirySweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
pub use encrypted::EncryptedTokenStore;
pub use hmac::HmacTokenStore;
pub use json::JsonTokenStore;
pub use key::{KeyError, SecretKey, KEY_LEN};
pub use oauth2::{
    IntrospectionConfig, IntrospectionResponse, IntrospectionSetupError, OAuth2TokenStore,
    DEFAULT_INTROSPECTION_TIMEOUT,
};
pub use random::{random_id, DEFAULT_ID_BYTES};

use crate::auth::RequestContext;
use crate::storage::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Separator between credential components. Never part of the base64url
/// alphabet.
pub const SEPARATOR: char = '.';

/// An issued credential's claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub expiry: DateTime<Utc>,
    pub subject: String,
    pub attributes: BTreeMap<String, String>,
}

impl Token {
    pub fn new(subject: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            expiry,
            subject: subject.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// A token valid for `ttl` from now, truncated to whole seconds so every
    /// store represents the expiry exactly. Saturates at the latest
    /// representable instant.
    pub fn expiring_in(subject: impl Into<String>, ttl: Duration) -> Self {
        let expiry = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expiry = DateTime::from_timestamp(expiry.timestamp(), 0).unwrap_or(expiry);
        Self::new(subject, expiry)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

/// Security properties a store guarantees. Wrappers derive theirs from the
/// delegate so a chain can be checked when it is wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreProperties {
    /// The identifier cannot be recovered or interpreted without a key
    pub confidential: bool,
    /// Modification of the credential is detected
    pub authenticated: bool,
    /// The server can revoke a credential before it expires
    pub stateful: bool,
    /// `create` and `revoke` are supported
    pub issues_tokens: bool,
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("introspection request timed out")]
    Timeout,

    #[error("introspection endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("{store} does not support {operation}")]
    Unsupported {
        store: &'static str,
        operation: &'static str,
    },

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenStoreError {
    /// Short label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            TokenStoreError::Storage(_) => "storage",
            TokenStoreError::Timeout => "timeout",
            TokenStoreError::Unavailable(_) => "unavailable",
            TokenStoreError::Unsupported { .. } => "unsupported",
            TokenStoreError::Encoding(_) => "encoding",
        }
    }

    /// True for failures of the infrastructure rather than of the credential
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TokenStoreError::Storage(_) | TokenStoreError::Timeout | TokenStoreError::Unavailable(_)
        )
    }
}

/// The store contract shared by every backend and wrapper
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Name used in log lines and errors
    fn name(&self) -> &'static str;

    fn properties(&self) -> StoreProperties;

    /// Issue a credential for `token`
    async fn create(&self, ctx: &RequestContext, token: &Token) -> Result<String, TokenStoreError>;

    /// Resolve a credential. Malformed, tampered, and unknown credentials are
    /// all `Ok(None)`.
    async fn read(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError>;

    /// Invalidate a credential. Unknown or already revoked credentials are a
    /// no-op.
    async fn revoke(&self, ctx: &RequestContext, token_id: &str) -> Result<(), TokenStoreError>;
}
