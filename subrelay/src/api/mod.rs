//! HTTP surface: router assembly and server lifecycle.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::Result;
use crate::services::ServiceContainer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    /// All application services.
    pub services: Arc<ServiceContainer>,
}

impl AppState {
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self {
            start_time: Instant::now(),
            services,
        }
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/subtitle", get(routes::subtitle::handle))
        .route("/api/timedtext", get(routes::subtitle::handle))
        .route("/health", get(routes::health::handle))
        .route("/admin/stats", get(routes::admin::handle))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until the cancellation token fires.
pub async fn serve(state: AppState, cancellation_token: CancellationToken) -> Result<()> {
    let config = &state.services.config.server;
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::Error::config(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "API server listening");

    let router = create_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await
        .map_err(|e| crate::Error::Other(format!("server error: {e}")))?;

    Ok(())
}
