//! Gatehouse - Authentication and Identity Broker
//!
//! Brokers login via OAuth2 identity providers and local password
//! accounts, issues opaque bearer tokens, and exposes user and role
//! administration.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod models;
mod providers;
mod services;
mod state;
mod storage;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;

/// How often expired tokens and temp sessions are garbage collected.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::init()?;
    tracing::info!(
        "Starting Gatehouse server on {}:{}",
        config.server.host,
        config.server.port
    );

    // Initialize application state
    let state = AppState::new().await?;
    tracing::info!("Application state initialized");

    // Bootstrap or reset the root account if a password was supplied.
    if let Ok(mut password) = std::env::var("GATEHOUSE_ROOT_PASSWORD") {
        state.local.create_root(&mut password).await?;
        tracing::info!("Root account bootstrapped");
    }

    // Periodically clear expired tokens and temporary sessions.
    let cleanup_storage = state.sqlite.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_storage.cleanup_expired().await {
                tracing::warn!("Expired-row cleanup failed: {}", e);
            }
        }
    });

    // Build router
    let app = Router::new()
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid address");

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
