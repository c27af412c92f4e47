//! Dukapo API Server
//!
//! The main API server: authentication, tenancy, catalog, stock, sales,
//! reporting, and subscription endpoints.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, Method};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dukapo_api::{routes::create_router, AppState};
use dukapo_shared::{create_pool, run_migrations, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dukapo_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dukapo API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    run_migrations(&pool).await?;

    // Demo bootstrap for empty datastores (SEED_DEMO=true).
    dukapo_api::seed::seed_if_empty(&pool, &config).await?;

    let state = AppState::new(pool, config.clone())?;

    // CORS: explicit origin allowlist. This layer is outermost so error
    // responses raised anywhere inside the router (authorization
    // middleware included) still carry CORS headers.
    let allowed_origins: Vec<axum::http::HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    tracing::info!(
        allowed_origins = ?config.cors_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .expose_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    // Request deadline: handlers past it are cut off and the client sees
    // a timeout. Gateway calls carry their own shorter deadline so a slow
    // gateway cannot hold the whole budget.
    let timeout = TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs));

    let app = create_router(state)
        .layer(timeout)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
