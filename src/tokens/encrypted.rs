//! Confidentiality wrapper: AES-256 in counter mode
//!
//! Hides the delegate's identifier from the client. CTR provides no
//! integrity: a flipped ciphertext bit flips the same plaintext bit. Put an
//! [`HmacTokenStore`](super::HmacTokenStore) outside this wrapper.

use crate::auth::RequestContext;
use crate::tokens::{SecretKey, StoreProperties, Token, TokenStore, TokenStoreError, SEPARATOR};
use aes::Aes256;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::Rng;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_LEN: usize = 16;

pub struct EncryptedTokenStore<S> {
    delegate: S,
    key: SecretKey,
}

impl<S: TokenStore> EncryptedTokenStore<S> {
    pub fn new(delegate: S, key: SecretKey) -> Self {
        Self { delegate, key }
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, TokenStoreError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill(&mut iv);

        let mut cipher = Aes256Ctr::new_from_slices(self.key.as_bytes(), &iv)
            .map_err(|e| TokenStoreError::Encoding(e.to_string()))?;
        let mut buf = plaintext.as_bytes().to_vec();
        cipher.apply_keystream(&mut buf);

        Ok(format!(
            "{}{}{}",
            URL_SAFE_NO_PAD.encode(iv),
            SEPARATOR,
            URL_SAFE_NO_PAD.encode(&buf)
        ))
    }

    /// `None` for anything that does not decrypt to UTF-8
    fn decrypt(&self, encrypted: &str) -> Option<String> {
        let (iv, ciphertext) = encrypted.split_once(SEPARATOR)?;
        let iv = URL_SAFE_NO_PAD.decode(iv).ok()?;
        let mut buf = URL_SAFE_NO_PAD.decode(ciphertext).ok()?;

        let mut cipher = Aes256Ctr::new_from_slices(self.key.as_bytes(), &iv).ok()?;
        cipher.apply_keystream(&mut buf);

        String::from_utf8(buf).ok()
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for EncryptedTokenStore<S> {
    fn name(&self) -> &'static str {
        "encrypted"
    }

    fn properties(&self) -> StoreProperties {
        let inner = self.delegate.properties();
        StoreProperties {
            confidential: true,
            // Malleable ciphertext: this layer cannot vouch for integrity
            authenticated: false,
            ..inner
        }
    }

    async fn create(&self, ctx: &RequestContext, token: &Token) -> Result<String, TokenStoreError> {
        let token_id = self.delegate.create(ctx, token).await?;
        self.encrypt(&token_id)
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError> {
        match self.decrypt(token_id) {
            Some(inner) => self.delegate.read(ctx, &inner).await,
            None => Ok(None),
        }
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &str) -> Result<(), TokenStoreError> {
        match self.decrypt(token_id) {
            Some(inner) => self.delegate.revoke(ctx, &inner).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::JsonTokenStore;
    use chrono::Duration;

    fn store() -> EncryptedTokenStore<JsonTokenStore> {
        EncryptedTokenStore::new(
            JsonTokenStore::new("https://localhost:4567"),
            SecretKey::generate(),
        )
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let store = store();
        let ctx = RequestContext::new();
        let token = Token::expiring_in("alice", Duration::minutes(10));

        let id = store.create(&ctx, &token).await.unwrap();
        assert_eq!(id.matches(SEPARATOR).count(), 1);
        assert_eq!(store.read(&ctx, &id).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_ciphertext_hides_claims() {
        let store = store();
        let ctx = RequestContext::new();
        let id = store
            .create(&ctx, &Token::expiring_in("alice", Duration::minutes(10)))
            .await
            .unwrap();

        let (_, ciphertext) = id.split_once(SEPARATOR).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(ciphertext).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("alice"));
    }

    #[tokio::test]
    async fn test_fresh_iv_per_call() {
        let store = store();
        let ctx = RequestContext::new();
        let token = Token::expiring_in("alice", Duration::minutes(10));
        let a = store.create(&ctx, &token).await.unwrap();
        let b = store.create(&ctx, &token).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_wrong_key_and_garbage_are_absent() {
        let ctx = RequestContext::new();
        let id = store()
            .create(&ctx, &Token::expiring_in("alice", Duration::minutes(10)))
            .await
            .unwrap();

        assert_eq!(store().read(&ctx, &id).await.unwrap(), None);
        assert_eq!(store().read(&ctx, "no-separator").await.unwrap(), None);
        assert_eq!(store().read(&ctx, "!!.!!").await.unwrap(), None);
        assert_eq!(store().read(&ctx, "AAAA.AAAA").await.unwrap(), None);
        store().revoke(&ctx, "garbage").await.unwrap();
    }

    #[test]
    fn test_not_authenticated_on_its_own() {
        let props = store().properties();
        assert!(props.confidential);
        assert!(!props.authenticated);
        assert!(!props.stateful);
    }
}
