use std::net::SocketAddr;

use clap::Parser;
use tracing::info;
use vigil_core::config::VigilConfig;
use vigil_gateway::{build_router, spawn_autostart, Gateway};

/// Self-continuing endpoint checker.
#[derive(Parser, Debug)]
#[command(name = "vigil-gateway", version, about)]
struct Cli {
    /// Path to vigil.toml (defaults to ~/.vigil/vigil.toml).
    #[arg(long, env = "VIGIL_CONFIG")]
    config: Option<String>,

    /// Override `gateway.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vigil_gateway=info,vigil_cycle=info,vigil_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    let mut config = VigilConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        VigilConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let autostart = config.cycle.autostart;

    let gateway = Gateway::open(config)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let state = gateway.spawn_background(shutdown_rx);
    let router = build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Vigil gateway listening on {}", addr);

    if autostart {
        spawn_autostart(&state);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // signal background loops to stop
    let _ = shutdown_tx.send(true);
    info!("Vigil gateway stopped");
    Ok(())
}
