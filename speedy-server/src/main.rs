use anyhow::{Context, Result};
use clap::Parser;
use speedy_server::config::local_hostname;
use speedy_server::{AppState, CacheService, HttpConnector, ServerConfig, create_router, init_metrics};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speedy-server")]
#[command(about = "Speedy distributed cache node", long_about = None)]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Node id, or DYNAMIC to discover it (overrides node.id)
    #[arg(long)]
    node_id: Option<String>,

    /// Cache capacity in entries (overrides cache.capacity)
    #[arg(long)]
    capacity: Option<usize>,
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(node_id) = &args.node_id {
        config.node.id = Some(node_id.clone());
    }
    if let Some(capacity) = args.capacity {
        config.cache.capacity = capacity;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(&config);
    info!("Starting Speedy Server v{}", env!("CARGO_PKG_VERSION"));

    let node = config.resolve_node(local_hostname().as_deref());
    info!("Node identity: {}", node);

    init_metrics();

    let service = Arc::new(CacheService::from_config(
        &config,
        node,
        Arc::new(HttpConnector),
    ));
    let app = create_router(AppState::new(service.clone()));

    // Bind server
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server_addr()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let token = CancellationToken::new();
    let server = tokio::spawn({
        let token = token.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }
    });

    service.register_with_cluster().await;
    service.election().run_election().await;
    info!("Leader after initial election: {:?}", service.election().leader());

    let monitor = service
        .election()
        .start_leader_heartbeat_monitor(token.clone());

    shutdown_signal().await;
    info!("Shutdown signal received");

    token.cancel();
    monitor.await?;
    server.await??;
    service.shutdown().await;

    Ok(())
}
