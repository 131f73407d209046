//! Remote validation through an OAuth2 token-introspection endpoint (RFC 7662)
//!
//! The authorization server owns issuance and revocation, so only `read` is
//! supported. Each `read` is one POST of `token=<credential>` authenticated with
//! the client's credentials.
//!
//! Response contract:
//! - `{"active": false}` or a body that is not valid JSON: absent
//! - `active: true` without `sub` or `exp`: absent
//! - otherwise a token with `scope`, `client_id`, and `username` copied into
//!   the attributes when present
//! - non-2xx status: [`TokenStoreError::Unavailable`]
//! - request timeout: [`TokenStoreError::Timeout`]

use crate::auth::RequestContext;
use crate::tokens::tls::{hardened_client_config, TlsError};
use crate::tokens::{StoreProperties, Token, TokenStore, TokenStoreError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::DateTime;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::form_urlencoded;
use url::Url;

pub const DEFAULT_INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the introspection endpoint
#[derive(Clone)]
pub struct IntrospectionConfig {
    pub endpoint: Url,
    pub client_id: String,
    pub client_secret: String,
    /// PEM bundle of trusted CA certificates
    pub ca_file: PathBuf,
    /// PEM CRLs covering every certificate in the server's chain
    pub crl_files: Vec<PathBuf>,
    /// Whole-request timeout, connect included
    pub timeout: Duration,
}

impl fmt::Debug for IntrospectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("ca_file", &self.ca_file)
            .field("crl_files", &self.crl_files)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// The subset of RFC 7662 fields this store understands
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl IntrospectionResponse {
    /// Map an introspection answer onto a token, if it describes one
    pub fn into_token(self) -> Option<Token> {
        if !self.active {
            return None;
        }
        let subject = self.sub.filter(|s| !s.is_empty())?;
        let expiry = DateTime::from_timestamp(self.exp?, 0)?;

        let mut token = Token::new(subject, expiry);
        for (key, value) in [
            ("scope", self.scope),
            ("client_id", self.client_id),
            ("username", self.username),
        ] {
            if let Some(value) = value {
                token.attributes.insert(key.to_string(), value);
            }
        }
        Some(token)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntrospectionSetupError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("introspection endpoint must use https: {0}")]
    InsecureEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct OAuth2TokenStore {
    endpoint: Url,
    authorization: String,
    client: reqwest::Client,
}

impl OAuth2TokenStore {
    /// Store talking to `config.endpoint` over the hardened transport
    pub fn new(config: &IntrospectionConfig) -> Result<Self, IntrospectionSetupError> {
        if config.endpoint.scheme() != "https" {
            return Err(IntrospectionSetupError::InsecureEndpoint(
                config.endpoint.to_string(),
            ));
        }

        let tls = hardened_client_config(&config.ca_file, &config.crl_files)?;
        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .https_only(true)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self::with_client(
            config.endpoint.clone(),
            &config.client_id,
            &config.client_secret,
            client,
        ))
    }

    /// Store using a caller-supplied HTTP client
    pub fn with_client(
        endpoint: Url,
        client_id: &str,
        client_secret: &str,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint,
            authorization: basic_authorization(client_id, client_secret),
            client,
        }
    }
}

/// RFC 6749 section 2.3.1: form-encode both halves before base64
fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    let credentials = format!(
        "{}:{}",
        form_urlencoded::byte_serialize(client_id.as_bytes()).collect::<String>(),
        form_urlencoded::byte_serialize(client_secret.as_bytes()).collect::<String>()
    );
    format!("Basic {}", STANDARD.encode(credentials))
}

fn classify(e: reqwest::Error) -> TokenStoreError {
    if e.is_timeout() {
        TokenStoreError::Timeout
    } else {
        // Drop the URL so log lines carry only the failure
        TokenStoreError::Unavailable(e.without_url().to_string())
    }
}

impl fmt::Debug for OAuth2TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2TokenStore")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenStore for OAuth2TokenStore {
    fn name(&self) -> &'static str {
        "oauth2"
    }

    fn properties(&self) -> StoreProperties {
        StoreProperties {
            confidential: true,
            authenticated: true,
            stateful: true,
            issues_tokens: false,
        }
    }

    async fn create(&self, _ctx: &RequestContext, _token: &Token) -> Result<String, TokenStoreError> {
        Err(TokenStoreError::Unsupported {
            store: self.name(),
            operation: "create",
        })
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> Result<Option<Token>, TokenStoreError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, &self.authorization)
            .header(ACCEPT, "application/json")
            .form(&[("token", token_id), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenStoreError::Unavailable(format!(
                "introspection endpoint returned {}",
                status
            )));
        }

        let body = response.bytes().await.map_err(classify)?;
        match serde_json::from_slice::<IntrospectionResponse>(&body) {
            Ok(introspection) => Ok(introspection.into_token()),
            Err(e) => {
                debug!(request_id = %ctx.request_id, error = %e, "Malformed introspection response");
                Ok(None)
            }
        }
    }

    async fn revoke(&self, _ctx: &RequestContext, _token_id: &str) -> Result<(), TokenStoreError> {
        Err(TokenStoreError::Unsupported {
            store: self.name(),
            operation: "revoke",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_authorization_form_encodes() {
        let header = basic_authorization("my client", "p@ss:word");
        let decoded = STANDARD.decode(header.strip_prefix("Basic ").unwrap()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "my+client:p%40ss%3Aword");
    }

    #[test]
    fn test_inactive_response_is_absent() {
        let response: IntrospectionResponse =
            serde_json::from_str(r#"{"active": false, "sub": "alice", "exp": 2000000000}"#).unwrap();
        assert!(response.into_token().is_none());
    }

    #[test]
    fn test_active_response_maps_to_token() {
        let response: IntrospectionResponse = serde_json::from_str(
            r#"{"active": true, "sub": "alice", "exp": 2000000000, "scope": "read write", "client_id": "board"}"#,
        )
        .unwrap();
        let token = response.into_token().unwrap();
        assert_eq!(token.subject, "alice");
        assert_eq!(token.expiry.timestamp(), 2_000_000_000);
        assert_eq!(token.attributes.get("scope").map(String::as_str), Some("read write"));
        assert_eq!(token.attributes.get("client_id").map(String::as_str), Some("board"));
        assert!(!token.attributes.contains_key("username"));
    }

    #[test]
    fn test_active_without_subject_or_expiry_is_absent() {
        for body in [
            r#"{"active": true, "exp": 2000000000}"#,
            r#"{"active": true, "sub": "alice"}"#,
            r#"{"active": true, "sub": "", "exp": 2000000000}"#,
        ] {
            let response: IntrospectionResponse = serde_json::from_str(body).unwrap();
            assert!(response.into_token().is_none(), "body {}", body);
        }
    }

    #[test]
    fn test_plain_http_endpoint_rejected() {
        let config = IntrospectionConfig {
            endpoint: Url::parse("http://as.example.com/introspect").unwrap(),
            client_id: "board".to_string(),
            client_secret: "secret".to_string(),
            ca_file: PathBuf::from("/nonexistent/ca.pem"),
            crl_files: vec![],
            timeout: DEFAULT_INTROSPECTION_TIMEOUT,
        };
        assert!(matches!(
            OAuth2TokenStore::new(&config),
            Err(IntrospectionSetupError::InsecureEndpoint(_))
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = IntrospectionConfig {
            endpoint: Url::parse("https://as.example.com/introspect").unwrap(),
            client_id: "board".to_string(),
            client_secret: "hunter22".to_string(),
            ca_file: PathBuf::from("ca.pem"),
            crl_files: vec![],
            timeout: DEFAULT_INTROSPECTION_TIMEOUT,
        };
        assert!(!format!("{:?}", config).contains("hunter22"));
    }
}
