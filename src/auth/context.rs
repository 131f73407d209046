//! Per-request authentication context

use crate::server::ApiError;
use std::collections::BTreeMap;
use uuid::Uuid;

/// What the authentication filter learned about the caller.
///
/// Inserted into the request extensions before any route runs; the
/// authorization filter and handlers read it back. Nothing here outlives
/// the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for log lines emitted while handling this request
    pub request_id: Uuid,
    /// Authenticated subject, if any
    pub subject: Option<String>,
    /// Attributes carried by the presented token
    pub attributes: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            subject: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Context for work that does not originate from an HTTP request
    pub fn background() -> Self {
        Self::new()
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }

    /// The subject, or `Unauthenticated`
    pub fn require_subject(&self) -> Result<&str, ApiError> {
        self.subject.as_deref().ok_or(ApiError::Unauthenticated)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_anonymous() {
        let ctx = RequestContext::new();
        assert!(!ctx.is_authenticated());
        assert!(matches!(ctx.require_subject(), Err(ApiError::Unauthenticated)));
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestContext::new().request_id, RequestContext::new().request_id);
    }
}
