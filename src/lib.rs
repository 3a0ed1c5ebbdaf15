//! authgate - social login for a browser frontend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - /auth/{provider}, /auth/{provider}/callback, /auth/logout │
//! │  - /, /getuser, /metrics                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Auth Layer                             │
//! │  - Provider clients (Google, Twitter, GitHub)               │
//! │  - Identity resolver (find-or-create)                       │
//! │  - Session manager                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx): users, sessions                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: greeting, current user and metrics handlers
//! - `auth`: OAuth flows, identity resolution, sessions
//! - `data`: User store
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Built once at startup; the provider set replaces any process-wide
/// strategy registry.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// User store
    pub db: Arc<data::Database>,

    /// Enabled OAuth providers
    pub providers: Arc<auth::Providers>,

    /// Session issuing and resolution
    pub sessions: Arc<auth::SessionManager>,

    /// HTTP client for provider calls
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to the user store (a failure is logged, not fatal)
    /// 2. Initialize HTTP client
    /// 3. Build provider clients
    /// 4. Initialize session manager
    ///
    /// # Errors
    /// Returns error if the configuration cannot be turned into clients
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to the user store
        let db = data::Database::connect_or_lazy(&config.database.url).await?;
        match db.count_users().await {
            Ok(count) => {
                metrics::USERS_TOTAL.set(count);
                tracing::info!(users = count, "User store ready");
            }
            Err(error) => tracing::warn!(%error, "Could not count users"),
        }

        // 2. Initialize HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("authgate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        // 3. Build provider clients
        let providers = auth::Providers::from_config(&config.providers, &config.server.base_url())?;
        let enabled: Vec<&str> = providers.enabled().iter().map(|p| p.as_str()).collect();
        if enabled.is_empty() {
            tracing::warn!("No OAuth providers configured; every login route will 404");
        } else {
            tracing::info!(providers = ?enabled, "OAuth providers configured");
        }

        // 4. Initialize session manager
        let sessions = auth::SessionManager::new(&config.session);

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            providers: Arc::new(providers),
            sessions: Arc::new(sessions),
            http_client: Arc::new(http_client),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.frontend);

    Router::new()
        .merge(api::user_router())
        .merge(auth::auth_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::attach_principal,
        ))
        .merge(api::metrics_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// CORS restricted to the frontend origin, with credentials
fn build_cors_layer(frontend: &config::FrontendConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    let origin = frontend.origin().and_then(|origin| {
        HeaderValue::from_str(&origin)
            .map_err(|e| error::AppError::Config(format!("invalid frontend origin: {e}")))
    });

    match origin {
        // Only a matching request origin is echoed back
        Ok(origin) => layer.allow_origin(AllowOrigin::list([origin])),
        Err(error) => {
            tracing::error!(
                %error,
                frontend = %frontend.url,
                "Failed to derive CORS origin from frontend URL; denying cross-origin requests"
            );
            layer
        }
    }
}

/// Purge expired sessions once
///
/// # Returns
/// Number of sessions removed
pub async fn purge_expired_sessions(state: &AppState) -> Result<u64, error::AppError> {
    let purged = state.db.purge_expired_sessions(chrono::Utc::now()).await?;
    if purged > 0 {
        metrics::SESSIONS_PURGED_TOTAL.inc_by(purged);
        tracing::info!(purged, "Expired sessions purged");
    }
    Ok(purged)
}
