use bookshelf_service::config::{BackendKind, Config};
use bookshelf_service::models::storage::{Backend, MemoryBackend, PostgresBackend, RedisBackend};
use bookshelf_service::services::catalog::{Catalog, GoogleBooksClient};
use bookshelf_service::services::session::SessionSigner;
use bookshelf_service::{build_router, AppState};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn connect_backend(config: &Config) -> Result<Backend, String> {
    let backend: Backend = match config.backend {
        BackendKind::Postgres => {
            info!("Using PostgreSQL backend");
            let postgres_backend = PostgresBackend::new(&config.database_url)
                .await
                .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;
            Arc::new(postgres_backend)
        }
        BackendKind::Redis => {
            info!("Using Redis backend");
            let redis_backend = RedisBackend::new(&config.redis_url)
                .map_err(|e| format!("Failed to connect to Redis: {}", e))?;
            Arc::new(redis_backend)
        }
        BackendKind::Memory => {
            warn!("Using in-memory backend, books are lost on restart");
            Arc::new(MemoryBackend::new())
        }
    };

    backend
        .test_connection()
        .await
        .map_err(|e| format!("Failed to connect to storage backend: {}", e))?;

    Ok(backend)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bookshelf_service=info,tower_http=info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let backend = match connect_backend(&config).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("Storage backend connection successful");

    let catalog: Catalog = Arc::new(
        GoogleBooksClient::new(&config.catalog_url)
            .with_api_key(config.catalog_api_key.clone())
            .with_language(config.catalog_language.clone()),
    );

    let secret = config.session_secret.clone().unwrap_or_else(|| {
        warn!("BOOKSHELF_SESSION_SECRET not set, sessions will not survive a restart");
        uuid::Uuid::new_v4().to_string()
    });
    let sessions = Arc::new(SessionSigner::new(
        secret,
        config.access_key.clone(),
        chrono::Duration::hours(config.session_ttl_hours),
    ));

    let app = build_router(AppState {
        backend,
        catalog,
        sessions,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Bookshelf service starting on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
