use std::time::Duration;

use anyhow::Result;
use dotenv::dotenv;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use metrics_pipeline::agent::{Orchestrator, Reporter};
use metrics_pipeline::config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::load().unwrap_or_else(|e| {
        error!("failed to load configuration: {:?}", e);
        std::process::exit(1);
    });

    info!(?config, "loaded agent configuration");

    let reporter = Reporter::new(config.server_address.clone(), config.hash_key.clone());
    let orchestrator = Orchestrator::new(
        reporter,
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.report_interval_secs),
        config.rate_limit,
    );

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_for_signal.cancel();
    });

    orchestrator.run(cancel).await?;
    info!("agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
