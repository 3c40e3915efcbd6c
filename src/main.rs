use anyhow::{anyhow, Context, Result};
use ingress_stats::api::{create_api_router, ApiState};
use ingress_stats::config::AppConfig;
use ingress_stats::listener::SocketListener;
use ingress_stats::{RegistryOptions, SocketCollector};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal ingress-stats error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;
    ingress_stats::metrics::init();

    let collector = SocketCollector::new(&RegistryOptions::from(&config))
        .context("create metric registry")?;
    collector.set_hosts(config.hosts.iter().cloned());

    let exposition = Arc::new(prometheus::Registry::new());
    collector
        .registry()
        .register(&exposition)
        .context("register collector families")?;

    // the socket path belongs to this process; clear a leftover from a previous run
    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => info!(path = %config.socket_path.display(), "removed stale telemetry socket"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("remove stale socket {}", config.socket_path.display())
            })
        }
    }

    let listener = SocketListener::bind(&config.socket_path, config.max_connections)
        .with_context(|| format!("bind telemetry socket {}", config.socket_path.display()))?;
    let socket = collector.start(listener);

    let api_router = create_api_router(ApiState {
        collector: collector.clone(),
        exposition,
    });
    let http = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("bind HTTP listener {}", config.listen_addr))?;
    info!(address = %config.listen_addr, "HTTP API server starting");
    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http, api_router).await {
            warn!(error = %e, "API server error");
        }
    });

    info!(
        socket = %config.socket_path.display(),
        namespace = %config.metrics_namespace,
        controller_class = %config.controller_class,
        controller_pod = %config.controller_pod,
        hosts = config.hosts.len(),
        "ingress-stats online"
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl_c listener error");
    }
    info!("Shutdown signal received, exiting");

    socket.stop().await;
    api_handle.abort();
    Ok(())
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
