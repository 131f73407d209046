//! Server configuration and token-store wiring

use crate::storage::TokenRepository;
use crate::tokens::{
    DatabaseTokenStore, EncryptedTokenStore, ExpirySweeper, HmacTokenStore, IntrospectionConfig,
    IntrospectionSetupError, JsonTokenStore, KeyError, OAuth2TokenStore, SecretKey,
    StoreProperties, TokenStore, DEFAULT_SWEEP_INTERVAL,
};
use axum::http::HeaderValue;
use clap::ValueEnum;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

pub const DEFAULT_BIND: &str = "127.0.0.1:4567";
pub const DEFAULT_AUDIENCE: &str = "https://localhost:4567";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);
/// Longest session lifetime accepted from configuration
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_CORS_ORIGIN: &str = "https://localhost:9999";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required for the {1} token store")]
    MissingKey(&'static str, StoreKind),

    #[error("the MAC key and the encryption key must differ")]
    KeyReuse,

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("the oauth2 token store needs an introspection endpoint")]
    MissingIntrospection,

    #[error("token store {0} does not detect tampering; pass --allow-insecure-store to run it anyway")]
    Insecure(StoreKind),

    #[error("token TTL must be between one second and 30 days")]
    InvalidTtl,

    #[error("invalid CORS origin {0:?}: expected scheme://host[:port]")]
    InvalidOrigin(String),

    #[error(transparent)]
    Introspection(#[from] IntrospectionSetupError),
}

/// Token store compositions. `encrypted-hmac-*` encrypts first and MACs the
/// ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Database,
    HmacDatabase,
    EncryptedDatabase,
    EncryptedHmacDatabase,
    Json,
    HmacJson,
    EncryptedHmacJson,
    Oauth2,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Database => "database",
            StoreKind::HmacDatabase => "hmac-database",
            StoreKind::EncryptedDatabase => "encrypted-database",
            StoreKind::EncryptedHmacDatabase => "encrypted-hmac-database",
            StoreKind::Json => "json",
            StoreKind::HmacJson => "hmac-json",
            StoreKind::EncryptedHmacJson => "encrypted-hmac-json",
            StoreKind::Oauth2 => "oauth2",
        }
    }

    /// Whether tokens live in the `tokens` table
    pub fn is_database_backed(&self) -> bool {
        matches!(
            self,
            StoreKind::Database
                | StoreKind::HmacDatabase
                | StoreKind::EncryptedDatabase
                | StoreKind::EncryptedHmacDatabase
        )
    }

    fn needs_mac_key(&self) -> bool {
        matches!(
            self,
            StoreKind::HmacDatabase
                | StoreKind::EncryptedHmacDatabase
                | StoreKind::HmacJson
                | StoreKind::EncryptedHmacJson
        )
    }

    fn needs_encryption_key(&self) -> bool {
        matches!(
            self,
            StoreKind::EncryptedDatabase
                | StoreKind::EncryptedHmacDatabase
                | StoreKind::EncryptedHmacJson
        )
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the server needs besides its storage backend
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreKind,
    pub mac_key: Option<SecretKey>,
    pub encryption_key: Option<SecretKey>,
    /// Audience stamped on and required of self-contained tokens
    pub audience: String,
    pub token_ttl: Duration,
    pub sweep_interval: Duration,
    pub introspection: Option<IntrospectionConfig>,
    pub allow_insecure_store: bool,
    /// Browser origins allowed cross-origin access
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 4567)),
            store: StoreKind::Database,
            mac_key: None,
            encryption_key: None,
            audience: DEFAULT_AUDIENCE.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            introspection: None,
            allow_insecure_store: false,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
        }
    }
}

impl ServerConfig {
    /// Token lifetime for newly issued sessions
    pub fn session_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        if self.token_ttl < Duration::from_secs(1) || self.token_ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::InvalidTtl);
        }
        chrono::Duration::from_std(self.token_ttl).map_err(|_| ConfigError::InvalidTtl)
    }

    /// Allowed CORS origins as header values. Each must be a bare
    /// `http`/`https` origin; a wildcard is refused.
    pub fn allowed_origins(&self) -> Result<Vec<HeaderValue>, ConfigError> {
        self.cors_origins
            .iter()
            .map(|origin| {
                let invalid = || ConfigError::InvalidOrigin(origin.clone());
                let url = Url::parse(origin).map_err(|_| invalid())?;
                let bare = matches!(url.scheme(), "http" | "https")
                    && url.host_str().is_some()
                    && url.path() == "/"
                    && url.query().is_none()
                    && url.fragment().is_none()
                    && url.username().is_empty()
                    && !origin.ends_with('/');
                if !bare {
                    return Err(invalid());
                }
                HeaderValue::from_str(origin).map_err(|_| invalid())
            })
            .collect()
    }

    fn mac_key(&self) -> Result<SecretKey, ConfigError> {
        self.mac_key
            .clone()
            .ok_or(ConfigError::MissingKey("a MAC key", self.store))
    }

    fn encryption_key(&self) -> Result<SecretKey, ConfigError> {
        self.encryption_key
            .clone()
            .ok_or(ConfigError::MissingKey("an encryption key", self.store))
    }
}

/// A wired token store plus the sweeper for its backing table, if any
pub struct TokenStoreChain {
    pub kind: StoreKind,
    pub store: Arc<dyn TokenStore>,
    pub sweeper: Option<ExpirySweeper>,
}

impl TokenStoreChain {
    pub fn properties(&self) -> StoreProperties {
        self.store.properties()
    }
}

/// Build and validate the configured token store
pub fn build_token_store(
    config: &ServerConfig,
    repository: Arc<dyn TokenRepository>,
) -> Result<TokenStoreChain, ConfigError> {
    let kind = config.store;

    if kind.needs_mac_key() && kind.needs_encryption_key() {
        if let (Some(mac), Some(enc)) = (&config.mac_key, &config.encryption_key) {
            if mac == enc {
                return Err(ConfigError::KeyReuse);
            }
        }
    }

    let database = DatabaseTokenStore::new(repository);
    let sweeper = kind
        .is_database_backed()
        .then(|| database.sweeper(config.sweep_interval));
    let json = || JsonTokenStore::new(config.audience.clone());

    let store: Arc<dyn TokenStore> = match kind {
        StoreKind::Database => Arc::new(database),
        StoreKind::HmacDatabase => Arc::new(HmacTokenStore::new(database, config.mac_key()?)),
        StoreKind::EncryptedDatabase => {
            Arc::new(EncryptedTokenStore::new(database, config.encryption_key()?))
        }
        StoreKind::EncryptedHmacDatabase => Arc::new(HmacTokenStore::new(
            EncryptedTokenStore::new(database, config.encryption_key()?),
            config.mac_key()?,
        )),
        StoreKind::Json => Arc::new(json()),
        StoreKind::HmacJson => Arc::new(HmacTokenStore::new(json(), config.mac_key()?)),
        StoreKind::EncryptedHmacJson => Arc::new(HmacTokenStore::new(
            EncryptedTokenStore::new(json(), config.encryption_key()?),
            config.mac_key()?,
        )),
        StoreKind::Oauth2 => {
            let introspection = config
                .introspection
                .as_ref()
                .ok_or(ConfigError::MissingIntrospection)?;
            Arc::new(OAuth2TokenStore::new(introspection)?)
        }
    };

    let properties = store.properties();
    if !properties.authenticated {
        if !config.allow_insecure_store {
            return Err(ConfigError::Insecure(kind));
        }
        warn!(store = %kind, "Token store does not detect tampering; running anyway");
    }

    info!(
        store = %kind,
        confidential = properties.confidential,
        authenticated = properties.authenticated,
        stateful = properties.stateful,
        issues_tokens = properties.issues_tokens,
        "Token store configured"
    );

    Ok(TokenStoreChain {
        kind,
        store,
        sweeper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RequestContext;
    use crate::storage::MemoryStore;
    use crate::tokens::Token;

    fn config(store: StoreKind) -> ServerConfig {
        ServerConfig {
            store,
            mac_key: Some(SecretKey::generate()),
            encryption_key: Some(SecretKey::generate()),
            ..ServerConfig::default()
        }
    }

    fn build(config: &ServerConfig) -> Result<TokenStoreChain, ConfigError> {
        build_token_store(config, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_authenticated_compositions_roundtrip() {
        let ctx = RequestContext::new();
        for kind in [
            StoreKind::Database,
            StoreKind::HmacDatabase,
            StoreKind::EncryptedHmacDatabase,
            StoreKind::HmacJson,
            StoreKind::EncryptedHmacJson,
        ] {
            let chain = build(&config(kind)).unwrap();
            assert!(chain.properties().authenticated, "{}", kind);
            assert_eq!(chain.sweeper.is_some(), kind.is_database_backed());

            let token = Token::expiring_in("alice", chrono::Duration::minutes(10));
            let id = chain.store.create(&ctx, &token).await.unwrap();
            assert_eq!(chain.store.read(&ctx, &id).await.unwrap(), Some(token), "{}", kind);
        }
    }

    #[test]
    fn test_unauthenticated_chains_refused() {
        for kind in [StoreKind::Json, StoreKind::EncryptedDatabase] {
            assert!(matches!(build(&config(kind)), Err(ConfigError::Insecure(k)) if k == kind));
        }
    }

    #[test]
    fn test_insecure_chain_allowed_with_flag() {
        let config = ServerConfig {
            allow_insecure_store: true,
            ..config(StoreKind::Json)
        };
        let chain = build(&config).unwrap();
        assert!(!chain.properties().authenticated);
        assert!(chain.sweeper.is_none());
    }

    #[test]
    fn test_missing_keys_rejected() {
        let no_mac = ServerConfig {
            mac_key: None,
            ..config(StoreKind::HmacJson)
        };
        assert!(matches!(build(&no_mac), Err(ConfigError::MissingKey(_, StoreKind::HmacJson))));

        let no_enc = ServerConfig {
            encryption_key: None,
            ..config(StoreKind::EncryptedHmacDatabase)
        };
        assert!(matches!(build(&no_enc), Err(ConfigError::MissingKey(_, _))));
    }

    #[test]
    fn test_same_key_for_mac_and_encryption_rejected() {
        let key = SecretKey::generate();
        let config = ServerConfig {
            mac_key: Some(key.clone()),
            encryption_key: Some(key),
            ..config(StoreKind::EncryptedHmacJson)
        };
        assert!(matches!(build(&config), Err(ConfigError::KeyReuse)));
    }

    #[test]
    fn test_oauth2_needs_introspection() {
        assert!(matches!(
            build(&config(StoreKind::Oauth2)),
            Err(ConfigError::MissingIntrospection)
        ));
    }

    #[test]
    fn test_store_kind_names_match_cli_values() {
        for kind in StoreKind::value_variants() {
            let value = kind.to_possible_value().unwrap();
            assert_eq!(value.get_name(), kind.as_str());
        }
    }

    #[test]
    fn test_session_ttl() {
        assert_eq!(
            ServerConfig::default().session_ttl().unwrap(),
            chrono::Duration::minutes(10)
        );
        let config = ServerConfig {
            token_ttl: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        assert!(matches!(config.session_ttl(), Err(ConfigError::InvalidTtl)));
    }

    #[test]
    fn test_session_ttl_upper_bound() {
        let at_limit = ServerConfig {
            token_ttl: MAX_TOKEN_TTL,
            ..ServerConfig::default()
        };
        let ttl = at_limit.session_ttl().unwrap();
        assert_eq!(ttl, chrono::Duration::days(30));
        Token::expiring_in("alice", ttl);

        for secs in [MAX_TOKEN_TTL.as_secs() + 1, 10_000_000_000_000, u64::MAX] {
            let config = ServerConfig {
                token_ttl: Duration::from_secs(secs),
                ..ServerConfig::default()
            };
            assert!(matches!(config.session_ttl(), Err(ConfigError::InvalidTtl)), "{}", secs);
        }
    }

    #[test]
    fn test_cors_origins() {
        let origins = ServerConfig::default().allowed_origins().unwrap();
        assert_eq!(origins, vec![HeaderValue::from_static("https://localhost:9999")]);

        for origin in [
            "*",
            "localhost:9999",
            "ftp://files.example",
            "https://board.example/",
            "https://board.example/app",
            "https://user@board.example",
        ] {
            let config = ServerConfig {
                cors_origins: vec![origin.to_string()],
                ..ServerConfig::default()
            };
            assert!(
                matches!(config.allowed_origins(), Err(ConfigError::InvalidOrigin(_))),
                "{}",
                origin
            );
        }
    }
}
