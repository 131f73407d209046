//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use wyche::config::{StoreKind, DEFAULT_AUDIENCE, DEFAULT_BIND, DEFAULT_CORS_ORIGIN};

#[derive(Parser)]
#[command(name = "wyche")]
#[command(about = "Message-board API with composable token stores", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "WYCHE_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve(ServeArgs),

    /// Initialize the database schema
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Set a user's permissions on a space
    ///
    /// Examples:
    ///   wyche grant --space 5 --user alice --perms rw
    ///   wyche grant --space 5 --user bob --perms ''
    Grant {
        /// Space id
        #[arg(long)]
        space: i64,

        /// Username
        #[arg(long)]
        user: String,

        /// Permission flags: any of r, w, d
        #[arg(long)]
        perms: String,
    },

    /// Delete expired tokens now
    Sweep,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a user
    Add {
        /// Username
        name: String,

        /// Password
        #[arg(long, env = "WYCHE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(short, long, env = "WYCHE_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Token store composition
    #[arg(long, env = "WYCHE_TOKEN_STORE", value_enum, default_value_t = StoreKind::Database)]
    pub token_store: StoreKind,

    /// HMAC key (base64url, 32 bytes)
    #[arg(long, env = "WYCHE_MAC_KEY", hide_env_values = true)]
    pub mac_key: Option<String>,

    /// Encryption key (base64url, 32 bytes), distinct from the MAC key
    #[arg(long, env = "WYCHE_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Audience for self-contained tokens
    #[arg(long, env = "WYCHE_AUDIENCE", default_value = DEFAULT_AUDIENCE)]
    pub audience: String,

    /// Session lifetime in seconds
    #[arg(long, env = "WYCHE_TOKEN_TTL", default_value_t = 600)]
    pub token_ttl: u64,

    /// Seconds between expired-token sweeps
    #[arg(long, env = "WYCHE_SWEEP_INTERVAL", default_value_t = 600)]
    pub sweep_interval: u64,

    /// Run a store that does not detect tampering
    #[arg(long, env = "WYCHE_ALLOW_INSECURE_STORE")]
    pub allow_insecure_store: bool,

    /// Browser origin allowed to call the API; repeat for each origin
    #[arg(
        long = "cors-origin",
        env = "WYCHE_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = DEFAULT_CORS_ORIGIN
    )]
    pub cors_origins: Vec<String>,

    /// Keep all state in memory instead of Postgres
    #[arg(long)]
    pub memory: bool,

    /// Introspection endpoint (https)
    #[arg(long, env = "WYCHE_INTROSPECTION_URL")]
    pub introspection_url: Option<String>,

    /// Client id for the introspection endpoint
    #[arg(long, env = "WYCHE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret for the introspection endpoint
    #[arg(long, env = "WYCHE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// CA bundle (PEM) trusted for the introspection endpoint
    #[arg(long, env = "WYCHE_CA_FILE")]
    pub ca_file: Option<PathBuf>,

    /// CRL file (PEM); repeat for each issuer in the chain
    #[arg(long = "crl", env = "WYCHE_CRL_FILES", value_delimiter = ',')]
    pub crl_files: Vec<PathBuf>,

    /// Introspection request timeout in seconds
    #[arg(long, env = "WYCHE_INTROSPECTION_TIMEOUT", default_value_t = 5)]
    pub introspection_timeout: u64,
}
