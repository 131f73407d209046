//! In-memory storage backend

use crate::storage::{
    PermissionRepository, StorageError, TokenRecord, TokenRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local tables guarded by one lock each. Every method takes the lock
/// once, so each call behaves like a single-statement transaction.
#[derive(Default)]
pub struct MemoryStore {
    tokens: RwLock<HashMap<String, TokenRecord>>,
    permissions: RwLock<HashMap<(i64, String), String>>,
    users: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token rows currently held
    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StorageError> {
        let mut tokens = self.tokens.write();
        if tokens.contains_key(&record.token_id_hash) {
            return Err(StorageError::Conflict("token".to_string()));
        }
        tokens.insert(record.token_id_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_token(&self, token_id_hash: &str) -> Result<Option<TokenRecord>, StorageError> {
        Ok(self.tokens.read().get(token_id_hash).cloned())
    }

    async fn delete_token(&self, token_id_hash: &str) -> Result<u64, StorageError> {
        Ok(self.tokens.write().remove(token_id_hash).map_or(0, |_| 1))
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, record| record.expiry >= now);
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn find_permissions(
        &self,
        space_id: i64,
        user_id: &str,
    ) -> Result<Option<String>, StorageError> {
        Ok(self
            .permissions
            .read()
            .get(&(space_id, user_id.to_string()))
            .cloned())
    }

    async fn set_permissions(
        &self,
        space_id: i64,
        user_id: &str,
        perms: &str,
    ) -> Result<(), StorageError> {
        self.permissions
            .write()
            .insert((space_id, user_id.to_string()), perms.to_string());
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user_id: &str, pw_hash: &str) -> Result<(), StorageError> {
        let mut users = self.users.write();
        if users.contains_key(user_id) {
            return Err(StorageError::Conflict(user_id.to_string()));
        }
        users.insert(user_id.to_string(), pw_hash.to_string());
        Ok(())
    }

    async fn find_password_hash(&self, user_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.users.read().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(hash: &str, expiry: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            token_id_hash: hash.to_string(),
            user_id: "alice".to_string(),
            expiry,
            attributes: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_token_insert_find_delete() {
        let store = MemoryStore::new();
        let rec = record("h1", Utc::now() + Duration::minutes(5));

        store.insert_token(&rec).await.unwrap();
        assert_eq!(store.find_token("h1").await.unwrap(), Some(rec));

        assert_eq!(store.delete_token("h1").await.unwrap(), 1);
        assert_eq!(store.delete_token("h1").await.unwrap(), 0);
        assert!(store.find_token("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_hash_conflicts() {
        let store = MemoryStore::new();
        let rec = record("h1", Utc::now());
        store.insert_token(&rec).await.unwrap();
        assert!(matches!(
            store.insert_token(&rec).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_expired_tokens() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_token(&record("old", now - Duration::seconds(1))).await.unwrap();
        store.insert_token(&record("new", now + Duration::seconds(60))).await.unwrap();

        assert_eq!(store.delete_expired_tokens(now).await.unwrap(), 1);
        assert!(store.find_token("old").await.unwrap().is_none());
        assert!(store.find_token("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_permissions_upsert() {
        let store = MemoryStore::new();
        assert!(store.find_permissions(5, "alice").await.unwrap().is_none());

        store.set_permissions(5, "alice", "r").await.unwrap();
        store.set_permissions(5, "alice", "rw").await.unwrap();
        assert_eq!(store.find_permissions(5, "alice").await.unwrap().as_deref(), Some("rw"));
        assert!(store.find_permissions(6, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_conflicts() {
        let store = MemoryStore::new();
        store.create_user("alice", "$scrypt$...").await.unwrap();
        assert!(matches!(
            store.create_user("alice", "other").await,
            Err(StorageError::Conflict(_))
        ));
    }
}
