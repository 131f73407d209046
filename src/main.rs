//! Wyche CLI entry point

mod cli;

use crate::cli::{Cli, Commands, ServeArgs, UserCommands};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;
use wyche::auth::{is_valid_username, HashCost, PermissionSet, MIN_PASSWORD_LEN};
use wyche::config::{build_token_store, ServerConfig, StoreKind};
use wyche::server::{self, AppState};
use wyche::storage::{
    MemoryStore, PermissionRepository, PostgresConfig, PostgresStore, Storage, UserRepository,
};
use wyche::tokens::{ExpirySweeper, IntrospectionConfig, SecretKey};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Only resolved by commands that touch Postgres
    let get_db_config = || -> Result<PostgresConfig> {
        if let Some(url) = &cli.database_url {
            PostgresConfig::from_url(url).context("Invalid DATABASE_URL")
        } else {
            PostgresConfig::from_env().context("DATABASE_URL not set")
        }
    };

    match cli.command {
        Commands::Serve(args) => {
            if args.memory {
                serve(Arc::new(MemoryStore::new()), args).await
            } else {
                let store = PostgresStore::new(get_db_config()?).await?;
                serve(Arc::new(store), args).await
            }
        }
        Commands::Init => init(get_db_config()?).await,
        Commands::User { command } => user(get_db_config()?, command).await,
        Commands::Grant { space, user, perms } => grant(get_db_config()?, space, user, perms).await,
        Commands::Sweep => sweep(get_db_config()?).await,
    }
}

fn server_config(args: ServeArgs) -> Result<ServerConfig> {
    let bind_addr = args.bind.parse().context("Invalid bind address")?;

    let mac_key = args
        .mac_key
        .as_deref()
        .map(SecretKey::from_base64url)
        .transpose()
        .context("Invalid MAC key")?;
    let encryption_key = args
        .encryption_key
        .as_deref()
        .map(SecretKey::from_base64url)
        .transpose()
        .context("Invalid encryption key")?;

    let introspection = match args.token_store {
        StoreKind::Oauth2 => {
            let endpoint = args
                .introspection_url
                .context("--introspection-url is required for the oauth2 store")?;
            Some(IntrospectionConfig {
                endpoint: Url::parse(&endpoint).context("Invalid introspection URL")?,
                client_id: args.client_id.context("--client-id is required")?,
                client_secret: args.client_secret.context("--client-secret is required")?,
                ca_file: args.ca_file.context("--ca-file is required")?,
                crl_files: args.crl_files,
                timeout: Duration::from_secs(args.introspection_timeout),
            })
        }
        _ => None,
    };

    Ok(ServerConfig {
        bind_addr,
        store: args.token_store,
        mac_key,
        encryption_key,
        audience: args.audience,
        token_ttl: Duration::from_secs(args.token_ttl),
        sweep_interval: Duration::from_secs(args.sweep_interval),
        introspection,
        allow_insecure_store: args.allow_insecure_store,
        cors_origins: args.cors_origins,
    })
}

async fn serve<S>(storage: Arc<S>, args: ServeArgs) -> Result<()>
where
    S: Storage + 'static,
{
    let config = server_config(args)?;
    let chain = build_token_store(&config, storage.clone()).context("Invalid token store")?;
    let state = AppState::new(storage, chain, config.session_ttl()?)
        .with_cors_origins(config.allowed_origins()?);

    info!("Starting Wyche server...");
    server::run(config.bind_addr, state).await
}

async fn init(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;
    println!("Database schema initialized successfully");
    Ok(())
}

async fn user(db_config: PostgresConfig, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { name, password } => {
            anyhow::ensure!(is_valid_username(&name), "Invalid username: {}", name);
            anyhow::ensure!(
                password.len() >= MIN_PASSWORD_LEN,
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            );

            let store = PostgresStore::new(db_config).await?;
            let hash = HashCost::default().hash_blocking(password).await?;
            store.create_user(&name, &hash).await?;

            println!("Created user {}", name);
        }
    }

    Ok(())
}

async fn grant(db_config: PostgresConfig, space: i64, user: String, perms: String) -> Result<()> {
    let set = PermissionSet::parse(&perms)
        .with_context(|| format!("Invalid permissions: {}", perms))?;

    let store = PostgresStore::new(db_config).await?;
    store.set_permissions(space, &user, &set.to_string()).await?;

    if set.is_empty() {
        println!("Space {}: {} has no permissions", space, user);
    } else {
        println!("Space {}: {} = {}", space, user, set);
    }
    Ok(())
}

async fn sweep(db_config: PostgresConfig) -> Result<()> {
    let store = Arc::new(PostgresStore::new(db_config).await?);
    let deleted = ExpirySweeper::new(store, Duration::ZERO).sweep_once().await?;
    println!("Deleted {} expired tokens", deleted);
    Ok(())
}
