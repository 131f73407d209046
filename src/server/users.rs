//! User registration

use crate::auth::{is_valid_username, MIN_PASSWORD_LEN};
use crate::server::{ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Deserialize)]
pub struct NewUser {
    username: String,
    password: String,
}

/// `POST /users`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(NewUser { username, password }) =
        payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if !is_valid_username(&username) {
        return Err(ApiError::BadRequest("invalid username".to_string()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let hash = state.hash_cost.hash_blocking(password).await?;
    state.users.create_user(&username, &hash).await?;

    info!(username = %username, "Registered user");

    let location = HeaderValue::from_str(&format!("/users/{}", username))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut response = (StatusCode::CREATED, Json(json!({ "username": username }))).into_response();
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}
