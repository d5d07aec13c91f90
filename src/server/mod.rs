//! HTTP surface.
//!
//! | Method | Path                 | Handler                   |
//! |--------|----------------------|---------------------------|
//! | POST   | `/api/llvm/compile`  | [`handlers::compile`]     |
//! | GET    | `/api/llvm/passes`   | [`handlers::list_passes`] |
//! | GET    | `/health`            | [`handlers::health`]      |
//! | GET    | `/metrics`           | Prometheus exposition     |

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::metrics::{init_metrics, metrics_handler};
use crate::pipeline::{PipelineConfig, PipelineOrchestrator};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
}

/// Builds the application router.
pub fn router(orchestrator: Arc<PipelineOrchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics_handler))
        .route("/api/llvm/passes", get(handlers::list_passes))
        .route("/api/llvm/compile", post(handlers::compile))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Binds `config.bind_addr` and serves until Ctrl-C.
///
/// # Errors
///
/// Returns `ServerError` if the address is invalid, the configuration is
/// rejected, or the listener cannot be bound.
pub async fn serve(config: PipelineConfig) -> Result<(), ServerError> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|_| ServerError::InvalidAddress(config.bind_addr.clone()))?;

    init_metrics()?;
    let orchestrator = Arc::new(PipelineOrchestrator::new(config)?);
    let listener = TcpListener::bind(addr).await?;

    serve_with_listener(listener, orchestrator).await
}

/// Serves on an already bound listener until Ctrl-C.
pub async fn serve_with_listener(
    listener: TcpListener,
    orchestrator: Arc<PipelineOrchestrator>,
) -> Result<(), ServerError> {
    let addr = listener.local_addr()?;
    info!(
        %addr,
        workspace_root = %orchestrator.config().workspace_root.display(),
        "Starting ir-forge server"
    );

    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
