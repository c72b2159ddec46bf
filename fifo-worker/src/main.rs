use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_dogstatsd::DogStatsDBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use fifo_worker::consumer::Consumer;
use fifo_worker::health;
use fifo_worker::types::Environment;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Environment::from_env()?;

    // JSON logs for staging/production (Datadog), plain text for development
    if env.json_logs() {
        fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();
    }

    info!("Starting FIFO worker in {:?} environment", env);

    if let Some(dd_agent_host) = env.dd_agent_host() {
        init_metrics(&dd_agent_host, &env.metrics_prefix())?;
        info!("✅ Initialized DogStatsD metrics");
    }

    let consumer = Consumer::from_environment(&env).await?;
    let pool = Arc::new(consumer.into_pool());
    info!("✅ Initialized worker pool");

    // Cancelled once every worker has exited, stops the health server
    let server_token = CancellationToken::new();
    let health_handle = {
        let pool = Arc::clone(&pool);
        let port = env.health_port();
        let token = server_token.clone();
        tokio::spawn(async move {
            if let Err(e) = health::start_health_server(pool, port, token).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let mut pool_handle = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.start(&CancellationToken::new()).await })
    };

    let finished = tokio::select! {
        () = shutdown_signal() => None,
        result = &mut pool_handle => Some(result),
    };

    let drained = match finished {
        Some(result) => Some(result),
        None => {
            info!("Shutting down FIFO worker...");
            pool.stop();
            let drain = tokio::time::timeout(env.shutdown_timeout(), &mut pool_handle).await;
            if drain.is_err() {
                warn!(
                    timeout_secs = env.shutdown_timeout().as_secs(),
                    active_workers = pool.active_workers(),
                    "Workers did not finish before the shutdown timeout"
                );
                pool_handle.abort();
            }
            drain.ok()
        }
    };

    match drained {
        Some(Ok(Ok(()))) => info!("All workers drained"),
        Some(Ok(Err(e))) => error!("Worker pool error: {}", e),
        Some(Err(e)) => error!("Worker pool task error: {}", e),
        None => {}
    }

    server_token.cancel();
    health_handle.await.ok();

    info!("✅ FIFO worker shutdown complete");
    Ok(())
}

/// Installs the global `DogStatsD` recorder behind the `metrics` macros
fn init_metrics(dd_agent_host: &str, prefix: &str) -> anyhow::Result<()> {
    DogStatsDBuilder::default()
        .with_remote_address(format!("{dd_agent_host}:8125"))
        .context("invalid DogStatsD address")?
        .set_global_prefix(prefix)
        .install()
        .context("failed to install DogStatsD exporter")
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
