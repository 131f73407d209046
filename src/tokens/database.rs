//! Database-backed token store and the expired-token sweep

use crate::auth::RequestContext;
use crate::storage::{StorageError, TokenRecord, TokenRepository};
use crate::tokens::{random_id, StoreProperties, Token, TokenStore, TokenStoreError, DEFAULT_ID_BYTES};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Only `sha256(id)` reaches the database, so a dump of the `tokens` table
/// yields no usable credentials. The id is already 160 random bits, so a fast
/// digest is enough.
fn hash_token_id(token_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token_id.as_bytes()))
}

/// Stateful store: the database row is the credential's authority
#[derive(Clone)]
pub struct DatabaseTokenStore {
    repository: Arc<dyn TokenRepository>,
}

impl DatabaseTokenStore {
    pub fn new(repository: Arc<dyn TokenRepository>) -> Self {
        Self { repository }
    }

    /// A sweeper sharing this store's repository
    pub fn sweeper(&self, interval: Duration) -> ExpirySweeper {
        ExpirySweeper::new(self.repository.clone(), interval)
    }
}

#[async_trait]
impl TokenStore for DatabaseTokenStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn properties(&self) -> StoreProperties {
        // An altered id is simply not found, so tampering resolves to absence
        StoreProperties {
            confidential: true,
            authenticated: true,
            stateful: true,
            issues_tokens: true,
        }
    }

    async fn create(&self, ctx: &RequestContext, token: &Token) -> Result<String, TokenStoreError> {
        let token_id = random_id(DEFAULT_ID_BYTES);
        let attributes = serde_json::to_value(&token.attributes)
            .map_err(|e| TokenStoreError::Encoding(e.to_string()))?;

        let record = TokenRecord {
            token_id_hash: hash_token_id(&token_id),
            user_id: token.subject.clone(),
            expiry: token.expiry,
            attributes,
        };
        self.repository.insert_token(&record).await?;

        debug!(request_id = %ctx.request_id, subject = %token.subject, "Issued database token");
        Ok(token_id)
    }

    async fn read(
        &self,
        _ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError> {
        let Some(record) = self.repository.find_token(&hash_token_id(token_id)).await? else {
            return Ok(None);
        };

        let attributes: BTreeMap<String, String> = serde_json::from_value(record.attributes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(Token {
            expiry: record.expiry,
            subject: record.user_id,
            attributes,
        }))
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &str) -> Result<(), TokenStoreError> {
        let deleted = self.repository.delete_token(&hash_token_id(token_id)).await?;
        debug!(request_id = %ctx.request_id, deleted, "Revoked database token");
        Ok(())
    }
}

/// Periodically deletes expired token rows.
///
/// Rows nobody explicitly revoked are only reclaimed here. Each pass is a
/// single delete-where-expired statement, so it can interleave freely with
/// in-flight `create`/`read`/`revoke` calls.
#[derive(Clone)]
pub struct ExpirySweeper {
    repository: Arc<dyn TokenRepository>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(repository: Arc<dyn TokenRepository>, interval: Duration) -> Self {
        Self { repository, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass now
    pub async fn sweep_once(&self) -> Result<u64, StorageError> {
        let deleted = self.repository.delete_expired_tokens(Utc::now()).await?;
        info!(deleted, "Deleted expired tokens");
        Ok(deleted)
    }

    /// Start the background schedule. The first pass runs one interval after
    /// start.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "Expired token sweep failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Expiry sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owns a running sweeper task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Expiry sweeper task panicked");
        }
    }
}
