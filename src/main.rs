//! authgate binary entry point

use authgate::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background session cleanup
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let default_filter = format!("authgate={},tower_http=debug", config.logging.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting authgate...");
    tracing::info!(
        frontend = %config.frontend.url,
        public_url = %config.server.base_url(),
        "Configuration loaded"
    );

    authgate::metrics::init_metrics();

    // 3. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 4. Build Axum router
    let app = authgate::build_router(state.clone());

    // 5. Start background tasks
    spawn_session_cleanup_task(state.clone());

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background expired-session cleanup task
fn spawn_session_cleanup_task(state: AppState) {
    tokio::spawn(async move {
        let configured_interval_secs = state.config.session.cleanup_interval_seconds;
        let interval_secs = configured_interval_secs.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        if configured_interval_secs == 0 {
            tracing::warn!("session.cleanup_interval_seconds=0 is invalid; clamped to 1 second");
        }

        loop {
            interval.tick().await;

            if let Err(error) = authgate::purge_expired_sessions(&state).await {
                tracing::error!(%error, "Session cleanup failed");
            }
        }
    });

    tracing::info!("Session cleanup task spawned");
}
