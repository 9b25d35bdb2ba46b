//! Moa bridge - links a Twitter account to a Mastodon account
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Index page and settings form                             │
//! │  - Twitter / Mastodon sign-in flows                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Host registry (one OAuth app per Mastodon server)        │
//! │  - Bridge store (save / delete)                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │        Data Layer            │      Platform Clients        │
//! │  - SQLite (sqlx)             │  - Twitter (OAuth 1.0a)      │
//! │                              │  - Mastodon (OAuth 2.0)      │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! The relay that copies posts between the two accounts runs elsewhere
//! and reads the bridges stored here.
//!
//! # Modules
//!
//! - `api`: Index page, settings and metrics handlers
//! - `auth`: Identity session and account linking
//! - `service`: Host registry and bridge store
//! - `platform`: Twitter and Mastodon HTTP clients
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool and platform clients.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Twitter API client
    pub twitter: Arc<dyn platform::TwitterApi>,

    /// Mastodon API client
    pub mastodon: Arc<dyn platform::MastodonApi>,

    /// Registered Mastodon hosts
    pub hosts: Arc<service::HostRegistry>,

    /// Bridge store
    pub bridges: Arc<service::BridgeService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build the HTTP client shared by both platform clients
    /// 3. Wire the services
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("moa-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let twitter = platform::TwitterClient::new(http_client.clone(), &config.twitter);
        let mastodon = platform::MastodonClient::new(http_client, &config.mastodon);

        let state = Self::from_parts(config, db, Arc::new(twitter), Arc::new(mastodon));
        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Assemble state from already-built parts
    pub fn from_parts(
        config: config::AppConfig,
        db: data::Database,
        twitter: Arc<dyn platform::TwitterApi>,
        mastodon: Arc<dyn platform::MastodonApi>,
    ) -> Self {
        let db = Arc::new(db);
        let hosts = Arc::new(service::HostRegistry::new(
            db.clone(),
            mastodon.clone(),
            config.server.external_url("/mastodon_oauthorized"),
        ));
        let bridges = Arc::new(service::BridgeService::new(
            db.clone(),
            hosts.clone(),
            twitter.clone(),
            mastodon.clone(),
        ));

        Self {
            config: Arc::new(config),
            db,
            twitter,
            mastodon,
            hosts,
            bridges,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::pages_router())
        .merge(auth::auth_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

/// Same-origin only over https; permissive for local http development
fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method};
    use tower_http::cors::CorsLayer;

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods([Method::GET, Method::POST]),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Invalid CORS origin; denying cross-origin requests"
            );
            CorsLayer::new()
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
