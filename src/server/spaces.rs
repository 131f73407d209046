//! Space routes and their permission rules

use crate::auth::{require_permission, PermissionFilter, PermissionSet, RequestContext};
use crate::server::{ApiError, AppState};
use crate::storage::PermissionRepository;
use axum::{
    extract::{Path, State},
    http::Method,
    middleware, Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const MESSAGES_ROUTE: &str = "/spaces/{space_id}/messages";
pub const MESSAGE_ROUTE: &str = "/spaces/{space_id}/messages/{msg_id}";
pub const MEMBERS_ROUTE: &str = "/spaces/{space_id}/members";
pub const PERMISSIONS_ROUTE: &str = "/spaces/{space_id}/permissions";

/// (method, route, required flags) for every space route
pub fn space_rules() -> Vec<(Method, &'static str, &'static str)> {
    vec![
        (Method::POST, MESSAGES_ROUTE, "w"),
        (Method::GET, MESSAGES_ROUTE, "r"),
        (Method::GET, MESSAGE_ROUTE, "r"),
        (Method::DELETE, MESSAGE_ROUTE, "d"),
        (Method::POST, MEMBERS_ROUTE, "rwd"),
        (Method::GET, PERMISSIONS_ROUTE, "r"),
    ]
}

/// Wrap `router` so each space route enforces its rule from [`space_rules`].
///
/// Routes must be registered under the full patterns above.
pub fn guard_space_routes<S>(router: Router<S>, permissions: Arc<dyn PermissionRepository>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    space_rules()
        .into_iter()
        .fold(router, |router, (method, route, required)| {
            let required = PermissionSet::parse(required).unwrap_or_else(|_| PermissionSet::all());
            let filter = PermissionFilter::new(method, required, permissions.clone()).on_route(route);
            router.route_layer(middleware::from_fn_with_state(filter, require_permission))
        })
}

/// `GET /spaces/{space_id}/permissions`: the caller's own flags
pub async fn own_permissions(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(space_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let subject = ctx.require_subject()?;
    let perms = state
        .permissions
        .find_permissions(space_id, subject)
        .await?
        .unwrap_or_default();

    Ok(Json(json!({ "space_id": space_id, "perms": perms })))
}
