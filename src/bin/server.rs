use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use metrics_pipeline::api::{create_router, AppState};
use metrics_pipeline::config::{ServerConfig, StorageBackend};
use metrics_pipeline::metrics::{install_recorder, PipelineMetrics};
use metrics_pipeline::middleware::SignState;
use metrics_pipeline::repository::{FileRepository, MemoryRepository, Repository, SqlRepository};
use metrics_pipeline::service::MetricService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load().unwrap_or_else(|e| {
        error!("failed to load configuration: {:?}", e);
        std::process::exit(1);
    });

    info!(?config, "loaded server configuration");

    let prometheus_handle = install_recorder();
    let pipeline_metrics = PipelineMetrics::new(prometheus_handle);

    let cancel = CancellationToken::new();
    let repo: Arc<dyn Repository> = match config.backend() {
        StorageBackend::Sql => {
            info!("selecting SQL storage backend");
            Arc::new(SqlRepository::connect(&config.database_dsn).await?)
        }
        StorageBackend::File => {
            info!(path = %config.file_storage_path, "selecting file storage backend");
            let file_repo = Arc::new(
                FileRepository::new(
                    config.file_storage_path.clone(),
                    config.store_interval_secs,
                    config.restore,
                )
                .await,
            );
            file_repo.spawn_periodic_save(cancel.clone());
            file_repo
        }
        StorageBackend::Memory => {
            info!("selecting in-memory storage backend");
            Arc::new(MemoryRepository::new())
        }
    };

    let service = MetricService::new(repo, pipeline_metrics.clone());
    let state = AppState {
        service,
        sign: SignState {
            secret: config.hash_key.clone(),
        },
        metrics: pipeline_metrics,
    };

    let app = create_router(state);

    let addr: SocketAddr = parse_listen_address(&config.listen_address);
    info!(%addr, "listening");

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    info!("server stopped accepting connections; background tasks cancelled");
    Ok(())
}

/// `ADDRESS` in this pipeline is Go-`net.Listen`-style (`:8080`, bare port
/// with no host). Normalize to a `SocketAddr` by defaulting the host.
fn parse_listen_address(addr: &str) -> SocketAddr {
    let normalized = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)))
}

async fn shutdown_signal(cancel: CancellationToken) {
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

    info!("shutdown signal received, draining in-flight requests");
    cancel.cancel();
}
