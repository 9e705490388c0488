//! # Queue Facade Service
//!
//! HTTP surface and traffic driver around a [`QueueService`].
//!
//! The service exposes:
//! - `GET /metrics` - prometheus text exposition of the service's registry
//! - `GET /health` - lifecycle state of the queue service
//!
//! and runs a [`traffic`] loop that keeps messages flowing through the
//! configured queue so the exported counters move.

pub mod traffic;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::{Registry, TextEncoder};
use queue_facade::{QueueError, QueueService};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Errors that end the service process
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(#[source] QueueError),

    #[error("Queue service failed to start: {0}")]
    StartFailed(#[source] QueueError),

    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },
}

impl ServiceError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
            Self::StartFailed(_) => 4,
        }
    }
}

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueueService>,
    pub registry: Registry,
}

impl AppState {
    pub fn new(service: Arc<QueueService>, registry: Registry) -> Self {
        Self { service, registry }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: bool,
    pub queue_url: String,
    pub version: String,
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

/// Serve the router on `bind` until `shutdown` resolves
pub async fn serve(
    bind: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServiceError> {
    let listener =
        tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: bind.to_string(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", bind);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Healthy while the queue service is running
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let running = state.service.is_running().await;
    let response = HealthResponse {
        status: if running { "healthy" } else { "unhealthy" }.to_string(),
        running,
        queue_url: state.service.configuration().await.queue_url,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let status = if running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    TextEncoder::new()
        .encode_to_string(&state.registry.gather())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
