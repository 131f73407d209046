//! Authorization filters

use crate::auth::{PermissionSet, RequestContext};
use crate::server::ApiError;
use crate::storage::PermissionRepository;
use axum::{
    extract::{FromRequestParts, MatchedPath, Path, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Path parameter naming the space a route belongs to
const SPACE_PARAM: &str = "space_id";

/// Middleware rejecting anonymous requests
pub async fn require_authentication(request: Request, next: Next) -> Result<Response, ApiError> {
    let authenticated = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(RequestContext::is_authenticated);

    if !authenticated {
        return Err(ApiError::Unauthenticated);
    }
    Ok(next.run(request).await)
}

/// Requires `required` flags on the request's space for one HTTP method.
///
/// Requests with another method, or (when `route` is set) for another
/// matched route pattern, pass through untouched.
#[derive(Clone)]
pub struct PermissionFilter {
    method: Method,
    required: PermissionSet,
    route: Option<&'static str>,
    permissions: Arc<dyn PermissionRepository>,
}

impl PermissionFilter {
    pub fn new(
        method: Method,
        required: PermissionSet,
        permissions: Arc<dyn PermissionRepository>,
    ) -> Self {
        Self {
            method,
            required,
            route: None,
            permissions,
        }
    }

    /// Restrict the filter to a single route pattern, e.g.
    /// `/spaces/{space_id}/members`
    pub fn on_route(mut self, route: &'static str) -> Self {
        self.route = Some(route);
        self
    }

    pub fn required(&self) -> PermissionSet {
        self.required
    }

    fn applies_to(&self, method: &Method, matched: Option<&str>) -> bool {
        if *method != self.method {
            return false;
        }
        match self.route {
            Some(route) => matched == Some(route),
            None => true,
        }
    }

    /// Decide whether `ctx` holds the required flags on `space_id`
    pub async fn check(&self, ctx: &RequestContext, space_id: &str) -> Result<(), ApiError> {
        let subject = ctx.require_subject()?;

        let space_id: i64 = space_id
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid space id".to_string()))?;

        // No row means no permissions
        let granted = match self.permissions.find_permissions(space_id, subject).await? {
            Some(perms) => PermissionSet::parse(&perms).unwrap_or_else(|e| {
                warn!(space_id, subject = %subject, error = %e, "Ignoring corrupt permission row");
                PermissionSet::empty()
            }),
            None => PermissionSet::empty(),
        };

        if granted.satisfies(self.required) {
            Ok(())
        } else {
            debug!(
                request_id = %ctx.request_id,
                space_id,
                subject = %subject,
                required = %self.required,
                granted = %granted,
                "Permission denied"
            );
            Err(ApiError::Forbidden)
        }
    }
}

/// Middleware form of [`PermissionFilter::check`], for use as a route layer
pub async fn require_permission(
    State(filter): State<PermissionFilter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let matched = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string());
    if !filter.applies_to(request.method(), matched.as_deref()) {
        return Ok(next.run(request).await);
    }

    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();

    let (mut parts, body) = request.into_parts();
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
        .await
        .map_err(|_| ApiError::BadRequest("invalid space id".to_string()))?;
    let space_id = params
        .get(SPACE_PARAM)
        .ok_or_else(|| ApiError::BadRequest("invalid space id".to_string()))?;

    filter.check(&ctx, space_id).await?;

    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn filter(required: &str) -> PermissionFilter {
        let memory = Arc::new(MemoryStore::new());
        memory.set_permissions(5, "alice", "r").await.unwrap();
        PermissionFilter::new(
            Method::GET,
            PermissionSet::parse(required).unwrap(),
            memory,
        )
    }

    fn as_user(subject: &str) -> RequestContext {
        RequestContext {
            subject: Some(subject.to_string()),
            ..RequestContext::new()
        }
    }

    #[tokio::test]
    async fn test_missing_flag_is_forbidden() {
        let result = filter("w").await.check(&as_user("alice"), "5").await;
        assert!(matches!(result, Err(ApiError::Forbidden)));
    }

    #[tokio::test]
    async fn test_present_flag_is_allowed() {
        filter("r").await.check(&as_user("alice"), "5").await.unwrap();
    }

    #[tokio::test]
    async fn test_all_required_flags_must_be_granted() {
        let result = filter("rwd").await.check(&as_user("alice"), "5").await;
        assert!(matches!(result, Err(ApiError::Forbidden)));
    }

    #[tokio::test]
    async fn test_no_row_is_always_denied() {
        for required in ["r", "w", "d", "rwd"] {
            let filter = filter(required).await;
            let other_user = filter.check(&as_user("bob"), "5").await;
            let other_space = filter.check(&as_user("alice"), "6").await;
            assert!(matches!(other_user, Err(ApiError::Forbidden)));
            assert!(matches!(other_space, Err(ApiError::Forbidden)));
        }
    }

    #[tokio::test]
    async fn test_anonymous_is_unauthenticated() {
        let result = filter("r").await.check(&RequestContext::new(), "5").await;
        assert!(matches!(result, Err(ApiError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_non_numeric_space_is_bad_request() {
        let result = filter("r").await.check(&as_user("alice"), "five").await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_applies_only_to_method_and_route() {
        let filter = filter("r").await.on_route("/spaces/{space_id}/messages");
        assert!(filter.applies_to(&Method::GET, Some("/spaces/{space_id}/messages")));
        assert!(!filter.applies_to(&Method::POST, Some("/spaces/{space_id}/messages")));
        assert!(!filter.applies_to(&Method::GET, Some("/spaces/{space_id}/members")));
    }
}
