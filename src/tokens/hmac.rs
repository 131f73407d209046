//! Integrity wrapper: HMAC-SHA256 tag appended to a delegate's identifier

use crate::auth::RequestContext;
use crate::tokens::{SecretKey, StoreProperties, Token, TokenStore, TokenStoreError, SEPARATOR};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Credentials look like `<delegate id>.<base64url tag>`. The delegate id may
/// itself contain separators, so the tag is split off at the last one.
pub struct HmacTokenStore<S> {
    delegate: S,
    key: SecretKey,
}

impl<S: TokenStore> HmacTokenStore<S> {
    pub fn new(delegate: S, key: SecretKey) -> Self {
        Self { delegate, key }
    }

    fn tag(&self, token_id: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(token_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// The delegate id if the tag verifies, compared in constant time
    fn verify<'a>(&self, token_id: &'a str) -> Option<&'a str> {
        let (inner, tag) = token_id.rsplit_once(SEPARATOR)?;
        let provided = URL_SAFE_NO_PAD.decode(tag).ok()?;
        let computed = self.tag(inner);

        if bool::from(computed.ct_eq(&provided)) {
            Some(inner)
        } else {
            None
        }
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for HmacTokenStore<S> {
    fn name(&self) -> &'static str {
        "hmac"
    }

    fn properties(&self) -> StoreProperties {
        StoreProperties {
            authenticated: true,
            ..self.delegate.properties()
        }
    }

    async fn create(&self, ctx: &RequestContext, token: &Token) -> Result<String, TokenStoreError> {
        let token_id = self.delegate.create(ctx, token).await?;
        let tag = URL_SAFE_NO_PAD.encode(self.tag(&token_id));
        Ok(format!("{}{}{}", token_id, SEPARATOR, tag))
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError> {
        match self.verify(token_id) {
            Some(inner) => self.delegate.read(ctx, inner).await,
            None => Ok(None),
        }
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &str) -> Result<(), TokenStoreError> {
        match self.verify(token_id) {
            Some(inner) => self.delegate.revoke(ctx, inner).await,
            None => Ok(()),
        }
    }
}
