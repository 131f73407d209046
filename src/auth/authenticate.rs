//! Authentication filter

use crate::auth::{
    is_valid_username, verify_password_blocking, RequestContext, UNKNOWN_USER_HASH,
};
use crate::server::ApiError;
use crate::storage::UserRepository;
use crate::tokens::{Token, TokenStore, TokenStoreError};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying the bearer credential
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";

/// Resolves presented credentials to a subject
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserRepository>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn TokenStore>, users: Arc<dyn UserRepository>) -> Self {
        Self { store, users }
    }

    /// Look a credential up in the store chain. Expired tokens are absent.
    pub async fn resolve_token(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError> {
        let token = self.store.read(ctx, token_id).await?;
        Ok(token.filter(|t| !t.is_expired_at(Utc::now())))
    }

    /// Check an `Authorization` header value.
    ///
    /// A header for another scheme is ignored. A malformed basic credential is
    /// a bad request; an unknown user or wrong password is `Ok(None)`.
    pub async fn resolve_basic(&self, header: &str) -> Result<Option<String>, ApiError> {
        let Some(encoded) = header.strip_prefix("Basic ") else {
            return Ok(None);
        };

        let decoded = STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| ApiError::BadRequest("invalid auth header".to_string()))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| ApiError::BadRequest("invalid auth header".to_string()))?;

        if !is_valid_username(username) {
            return Err(ApiError::BadRequest("invalid username".to_string()));
        }

        let stored = self.users.find_password_hash(username).await?;
        let known = stored.is_some();
        let stored = stored.unwrap_or_else(|| UNKNOWN_USER_HASH.to_string());

        if verify_password_blocking(password.to_string(), stored).await? && known {
            Ok(Some(username.to_string()))
        } else {
            Ok(None)
        }
    }

    async fn populate(&self, ctx: &mut RequestContext, headers: &HeaderMap) -> Result<(), ApiError> {
        if let Some(value) = headers.get(CSRF_TOKEN_HEADER) {
            let Ok(token_id) = value.to_str() else {
                debug!(request_id = %ctx.request_id, "Credential rejected");
                return Ok(());
            };

            match self.resolve_token(ctx, token_id).await {
                Ok(Some(token)) => {
                    ctx.subject = Some(token.subject);
                    ctx.attributes = token.attributes;
                }
                Ok(None) => debug!(request_id = %ctx.request_id, "Credential rejected"),
                Err(e) => warn!(
                    request_id = %ctx.request_id,
                    store = self.store.name(),
                    kind = e.kind(),
                    error = %e,
                    "Token validation failed"
                ),
            }
            return Ok(());
        }

        if let Some(value) = headers.get(AUTHORIZATION) {
            let header = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("invalid auth header".to_string()))?;

            match self.resolve_basic(header).await? {
                Some(username) => ctx.subject = Some(username),
                None => debug!(request_id = %ctx.request_id, "Credential rejected"),
            }
        }

        Ok(())
    }
}

/// Middleware attaching a [`RequestContext`] to every request.
///
/// An `X-CSRF-Token` header takes precedence over `Authorization: Basic`.
/// Failed authentication leaves the context anonymous; enforcement belongs
/// to the authorization filters.
pub async fn authenticate(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut ctx = RequestContext::new();
    authenticator.populate(&mut ctx, request.headers()).await?;

    if let Some(subject) = &ctx.subject {
        debug!(request_id = %ctx.request_id, subject = %subject, "Authenticated request");
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
