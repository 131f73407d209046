//! Storage backends for Wyche
//!
//! - Postgres: durable storage for users, tokens, and space permissions
//! - Memory: process-local backend with the same semantics, used by tests and
//!   single-node development servers

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

pub use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A persisted token row. The raw credential is never stored, only its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub token_id_hash: String,
    pub user_id: String,
    pub expiry: DateTime<Utc>,
    pub attributes: serde_json::Value,
}

/// Trait for the `tokens` table
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Insert a new token row
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StorageError>;

    /// Look up a token row by the hash of its identifier
    async fn find_token(&self, token_id_hash: &str) -> Result<Option<TokenRecord>, StorageError>;

    /// Delete a token row, returns the number of rows removed (0 or 1)
    async fn delete_token(&self, token_id_hash: &str) -> Result<u64, StorageError>;

    /// Delete every row whose expiry is before `now`
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Trait for the `permissions` table
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Get the raw permission string for a (space, user) pair
    async fn find_permissions(
        &self,
        space_id: i64,
        user_id: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Insert or replace the permission string for a (space, user) pair
    async fn set_permissions(
        &self,
        space_id: i64,
        user_id: &str,
        perms: &str,
    ) -> Result<(), StorageError>;
}

/// Trait for the `users` table
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Register a user with an already-hashed password
    async fn create_user(&self, user_id: &str, pw_hash: &str) -> Result<(), StorageError>;

    /// Get the stored password hash for a user
    async fn find_password_hash(&self, user_id: &str) -> Result<Option<String>, StorageError>;
}

/// A backend that provides every table the server needs
pub trait Storage: TokenRepository + PermissionRepository + UserRepository {}

impl<T> Storage for T where T: TokenRepository + PermissionRepository + UserRepository {}
