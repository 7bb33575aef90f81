use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use tokenkeeper::auth::TokenSigner;
use tokenkeeper::configuration::{get_configuration, Settings, TokenStoreBackend};
use tokenkeeper::credentials::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use tokenkeeper::issuance::TokenService;
use tokenkeeper::remote::{CallPolicy, HttpTokenStore};
use tokenkeeper::startup::{run, run_internal, Services};
use tokenkeeper::telemetry::init_telemetry;
use tokenkeeper::token_store::sweeper::spawn_sweeper;
use tokenkeeper::token_store::{InMemoryTokenStore, PgTokenStore, RefreshTokenStore};

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

/// Build both stores for the configured backend
async fn build_stores(
    configuration: &Settings,
) -> std::io::Result<(Arc<dyn CredentialStore>, Arc<dyn RefreshTokenStore>)> {
    let backend = configuration.token_store.backend;

    if backend == TokenStoreBackend::Memory {
        tracing::warn!("Using in-memory stores, nothing survives a restart");
        return Ok((
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryTokenStore::new()),
        ));
    }

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;
    tracing::info!("Database connection pool created successfully");

    let credentials = PgCredentialStore::new(pool.clone());
    credentials.init_schema().await.map_err(|e| {
        tracing::error!("Failed to prepare credentials schema: {}", e);
        startup_error(std::io::ErrorKind::Other, "Schema error")
    })?;

    if backend == TokenStoreBackend::Remote {
        let services = &configuration.services;
        tracing::info!(url = %services.token_store_url, "Using remote refresh token store");
        let remote = HttpTokenStore::new(
            services.token_store_url.clone(),
            services.request_timeout(),
            CallPolicy::from_settings(services),
        )
        .map_err(|e| {
            tracing::error!("Failed to build token store client: {}", e);
            startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;
        return Ok((Arc::new(credentials), Arc::new(remote)));
    }

    let tokens = PgTokenStore::new(pool);
    tokens.init_schema().await.map_err(|e| {
        tracing::error!("Failed to prepare refresh token schema: {}", e);
        startup_error(std::io::ErrorKind::Other, "Schema error")
    })?;
    Ok((Arc::new(credentials), Arc::new(tokens)))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let signer = TokenSigner::new(&configuration.jwt).map_err(|e| {
        tracing::error!("Invalid signing configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let (credentials, token_store) = build_stores(&configuration).await?;

    // the owner of the store sweeps it
    let local_token_store = if configuration.token_store.backend.is_local() {
        spawn_sweeper(
            token_store.clone(),
            configuration.token_store.sweep_interval(),
            configuration.token_store.sweep_initial_delay(),
        );
        Some(token_store.clone())
    } else {
        None
    };

    let tokens = TokenService::new(signer, token_store)
        .degrade_on_store_failure(configuration.services.degrade_on_store_failure);
    if configuration.services.degrade_on_store_failure {
        tracing::warn!("Token issuance continues when refresh tokens cannot be stored");
    }

    let services = Services {
        credentials,
        tokens,
        local_token_store,
        login: configuration.login.clone(),
    };

    let application = &configuration.application;
    let address = format!("{}:{}", application.host, application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let internal_address = format!("{}:{}", application.internal_host, application.internal_port);
    let internal_listener = TcpListener::bind(&internal_address)?;
    tracing::info!("Internal API listening on: {}", internal_address);

    let server = run(listener, services.clone())?;
    let internal_server = run_internal(internal_listener, services)?;
    tracing::info!("Server started successfully");

    tokio::try_join!(server, internal_server)?;
    Ok(())
}
