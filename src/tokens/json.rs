//! Self-contained tokens: the claims are the credential
//!
//! `base64url(json{sub, exp, aud, attrs})` with no server-side state. On its
//! own this offers neither confidentiality nor integrity, and `revoke` cannot
//! do anything before the natural expiry.

use crate::auth::RequestContext;
use crate::tokens::{StoreProperties, Token, TokenStore, TokenStoreError};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    aud: Vec<String>,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
}

pub struct JsonTokenStore {
    audience: String,
}

impl JsonTokenStore {
    /// `audience` is stamped on issued tokens and required on read
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
        }
    }

    fn decode(&self, token_id: &str) -> Option<Token> {
        let json = URL_SAFE_NO_PAD.decode(token_id).ok()?;
        let claims: Claims = serde_json::from_slice(&json).ok()?;

        if !claims.aud.iter().any(|aud| aud == &self.audience) {
            return None;
        }
        if claims.sub.is_empty() {
            return None;
        }

        Some(Token {
            expiry: DateTime::from_timestamp(claims.exp, 0)?,
            subject: claims.sub,
            attributes: claims.attrs,
        })
    }
}

#[async_trait]
impl TokenStore for JsonTokenStore {
    fn name(&self) -> &'static str {
        "json"
    }

    fn properties(&self) -> StoreProperties {
        StoreProperties {
            confidential: false,
            authenticated: false,
            stateful: false,
            issues_tokens: true,
        }
    }

    async fn create(&self, _ctx: &RequestContext, token: &Token) -> Result<String, TokenStoreError> {
        let claims = Claims {
            sub: token.subject.clone(),
            exp: token.expiry.timestamp(),
            aud: vec![self.audience.clone()],
            attrs: token.attributes.clone(),
        };
        let json =
            serde_json::to_vec(&claims).map_err(|e| TokenStoreError::Encoding(e.to_string()))?;

        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    async fn read(
        &self,
        _ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError> {
        Ok(self.decode(token_id))
    }

    async fn revoke(&self, ctx: &RequestContext, _token_id: &str) -> Result<(), TokenStoreError> {
        debug!(request_id = %ctx.request_id, "Self-contained token cannot be revoked early");
        Ok(())
    }
}
