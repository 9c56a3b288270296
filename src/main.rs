mod calculations;
mod circuit_breaker;
mod config;
mod db;
mod errors;
mod fees;
mod handlers;
mod models;
mod quote_client;
mod scenario;
mod states;
mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the refresh
/// deduplication cache and the pricing-engine client, then starts the Axum
/// server with rate limiting and CORS in front of the API routes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rate_quote_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Refresh deduplication cache (5 minute TTL, 10k max entries), enough to
    // cover one engine round-trip per profile
    let refresh_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();
    tracing::info!("Refresh deduplication cache initialized");

    // Pricing engine client
    let mortech = match quote_client::MortechClient::new(&config) {
        Ok(client) => {
            tracing::info!("Mortech client initialized: {}", config.mortech_endpoint);
            Arc::new(client)
        }
        Err(e) => {
            tracing::error!("Failed to initialize Mortech client: {}", e);
            anyhow::bail!("Mortech client initialization failed");
        }
    };

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        mortech,
        refresh_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route(
            "/api/v1/profiles/purchase",
            post(handlers::create_purchase_profile),
        )
        .route(
            "/api/v1/profiles/refinance",
            post(handlers::create_refinance_profile),
        )
        .route(
            "/api/v1/profiles/:id",
            get(handlers::get_profile).patch(handlers::update_profile),
        )
        .route(
            "/api/v1/profiles/:id/rate-quote",
            post(handlers::refresh_rate_quote),
        )
        .route(
            "/api/v1/profiles/:id/scenario",
            get(handlers::get_scenario),
        )
        .route(
            "/api/v1/profiles/:id/scenario/full",
            get(handlers::get_full_scenario),
        )
        .route(
            "/api/v1/rate-quotes/:id",
            get(handlers::get_request_results),
        )
        .route("/api/v1/states", get(handlers::licensed_states))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check bypassing rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
