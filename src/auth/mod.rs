//! Authentication and authorization
//!
//! Request pipeline:
//! - [`authenticate`]: resolves an `X-CSRF-Token` credential through the
//!   configured token store, or else HTTP basic auth against the users table,
//!   and attaches the outcome as a [`RequestContext`]. Anonymous requests pass.
//! - [`require_authentication`]: rejects requests without a subject.
//! - [`require_permission`]: per (method, required flags) check against the
//!   permissions table for the request's space.
//!
//! Permission flags:
//! - `r`: read messages in a space
//! - `w`: post messages
//! - `d`: delete messages

mod authenticate;
mod authorize;
mod context;
mod password;
mod permissions;

pub use authenticate::{authenticate, Authenticator, CSRF_TOKEN_HEADER};
pub use authorize::{require_authentication, require_permission, PermissionFilter};
pub use context::RequestContext;
pub use password::{
    is_valid_username, verify_password, verify_password_blocking, HashCost, PasswordError,
    MIN_PASSWORD_LEN, UNKNOWN_USER_HASH,
};
pub use permissions::{Permission, PermissionError, PermissionSet};
