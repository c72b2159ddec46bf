use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::worker::{PoolState, WorkerPool};

/// Health check endpoint
///
/// Returns 200 while the pool is idle or running and 503 once it is
/// stopping or stopped, together with per-worker counters.
async fn health(State(pool): State<Arc<WorkerPool>>) -> impl IntoResponse {
    let pool_state = pool.state();
    let (status_code, status) = match pool_state {
        PoolState::Idle | PoolState::Running => (StatusCode::OK, "healthy"),
        PoolState::Stopping | PoolState::Stopped => {
            (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
        }
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "fifo-worker",
            "pool_state": pool_state,
            "active_workers": pool.active_workers(),
            "workers": pool.worker_stats(),
        })),
    )
}

/// Health router, exposed for tests
#[must_use]
pub fn router(pool: Arc<WorkerPool>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(pool)
}

/// Start the health check HTTP server
///
/// # Errors
///
/// Returns an error if the server fails to bind to the specified port
pub async fn start_health_server(
    pool: Arc<WorkerPool>,
    port: u16,
    shutdown_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Health check server listening on {}", addr);

    axum::serve(listener, router(pool))
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await?;

    Ok(())
}
