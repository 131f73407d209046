//! Wyche HTTP server
//!
//! Routes:
//! - `POST /users`: register
//! - `POST /sessions`, `DELETE /sessions`: login and logout for an
//!   authenticated caller (only when the configured store can issue
//!   credentials)
//! - `DELETE /expired_tokens`: immediate expiry sweep (database-backed
//!   stores only)
//! - `GET /spaces/{space_id}/permissions`: the caller's own flags

mod error;
mod headers;
mod sessions;
mod spaces;
mod users;

pub use error::ApiError;
pub use spaces::{
    guard_space_routes, space_rules, MEMBERS_ROUTE, MESSAGES_ROUTE, MESSAGE_ROUTE,
    PERMISSIONS_ROUTE,
};

use crate::auth::{authenticate, require_authentication, Authenticator, HashCost};
use crate::config::TokenStoreChain;
use crate::storage::{PermissionRepository, Storage, UserRepository};
use crate::tokens::{ExpirySweeper, TokenStore};
use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenStore>,
    pub authenticator: Authenticator,
    pub permissions: Arc<dyn PermissionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub token_ttl: chrono::Duration,
    pub sweeper: Option<ExpirySweeper>,
    pub hash_cost: HashCost,
    /// Origins granted CORS access; empty denies every cross-origin caller
    pub cors_origins: Vec<HeaderValue>,
}

impl AppState {
    pub fn new<S>(storage: Arc<S>, chain: TokenStoreChain, token_ttl: chrono::Duration) -> Self
    where
        S: Storage + 'static,
    {
        let users: Arc<dyn UserRepository> = storage.clone();
        Self {
            authenticator: Authenticator::new(chain.store.clone(), users.clone()),
            tokens: chain.store,
            permissions: storage,
            users,
            token_ttl,
            sweeper: chain.sweeper,
            hash_cost: HashCost::default(),
            cors_origins: Vec::new(),
        }
    }

    pub fn with_hash_cost(mut self, cost: HashCost) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<HeaderValue>) -> Self {
        self.cors_origins = origins;
        self
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new().route("/users", post(users::register));

    if state.tokens.properties().issues_tokens {
        app = app.route(
            "/sessions",
            post(sessions::login)
                .delete(sessions::logout)
                .route_layer(middleware::from_fn(require_authentication)),
        );
    }

    if state.sweeper.is_some() {
        app = app.route(
            "/expired_tokens",
            delete(sessions::expired_tokens)
                .route_layer(middleware::from_fn(require_authentication)),
        );
    }

    let spaces = Router::new().route(PERMISSIONS_ROUTE, get(spaces::own_permissions));
    let spaces = guard_space_routes(spaces, state.permissions.clone());
    let cors = headers::cors(state.cors_origins.clone());

    app.merge(spaces)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            authenticate,
        ))
        .layer(middleware::from_fn(headers::require_json))
        .layer(cors)
        .layer(middleware::from_fn(headers::security_headers))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Serve until SIGINT/SIGTERM, then stop the sweeper
pub async fn run(bind_addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    let sweeper = state.sweeper.clone().map(|sweeper| {
        info!(interval_secs = sweeper.interval().as_secs(), "Starting expiry sweeper");
        sweeper.spawn()
    });

    let app = router(state);
    info!(addr = %bind_addr, "Wyche API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(handle) = sweeper {
        handle.shutdown().await;
    }

    served?;
    info!("Wyche API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
