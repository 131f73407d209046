//! Wyche - credential subsystem for a message-board API
//!
//! Interchangeable token stores that issue, validate, and revoke opaque bearer
//! credentials, composed as wrappers to layer confidentiality and integrity,
//! plus the authentication and authorization filters that consume them.

pub mod auth;
pub mod config;
pub mod server;
pub mod storage;
pub mod tokens;

pub use auth::{Permission, PermissionSet, RequestContext};
pub use config::{build_token_store, ServerConfig, StoreKind, TokenStoreChain};
pub use server::{router, ApiError, AppState};
pub use tokens::{StoreProperties, Token, TokenStore, TokenStoreError};
