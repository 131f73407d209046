//! Session endpoints: login, logout, and expired-token cleanup

use crate::auth::{RequestContext, CSRF_TOKEN_HEADER};
use crate::server::{ApiError, AppState};
use crate::tokens::Token;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::info;

/// `POST /sessions`: issue a credential for the authenticated caller
pub async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let subject = ctx.require_subject()?;
    let token = Token::expiring_in(subject, state.token_ttl);
    let token_id = state.tokens.create(&ctx, &token).await?;

    info!(
        request_id = %ctx.request_id,
        subject = %subject,
        store = state.tokens.name(),
        "Session created"
    );
    Ok((StatusCode::CREATED, Json(json!({ "token": token_id }))))
}

/// `DELETE /sessions`: revoke the credential in `X-CSRF-Token`
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token_id = headers
        .get(CSRF_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing token header".to_string()))?;

    state.tokens.revoke(&ctx, token_id).await?;

    info!(request_id = %ctx.request_id, "Session revoked");
    Ok(Json(json!({})))
}

/// `DELETE /expired_tokens`: run one expiry sweep now
pub async fn expired_tokens(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sweeper = state.sweeper.as_ref().ok_or(ApiError::NotFound)?;
    let deleted = sweeper.sweep_once().await?;
    Ok(Json(json!({ "deleted": deleted })))
}
