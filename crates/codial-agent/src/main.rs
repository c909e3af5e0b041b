//! # codial-agent
//!
//! Agent-core server binary: wires configuration, observability, the
//! runtime container, and the HTTP server, then runs until SIGINT.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

use codial_server::container::DRAIN_DEADLINE;
use codial_server::{build_runtime, CodialServer, CoreConfig};

/// Codial agent core server.
#[derive(Parser, Debug)]
#[command(name = "codial-agent", about = "Codial agent core server")]
struct Cli {
    /// Host to bind (overrides CORE_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides CORE_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Workspace root for policy files (overrides CORE_WORKSPACE_ROOT).
    #[arg(long)]
    workspace_root: Option<String>,

    /// Log filter (overrides RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins over the CLI level when set.
fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level);

    let mut config = CoreConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(workspace_root) = cli.workspace_root {
        config.workspace_root = workspace_root;
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let (state, runtime) = build_runtime(config, Some(metrics_handle))
        .await
        .context("failed to assemble runtime")?;

    let server = CodialServer::new(state);
    let (addr, server_handle) = server.listen().await.context("failed to bind listener")?;
    info!(%addr, "codial agent core listening");

    let shutdown_token = server.shutdown().token();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
        () = shutdown_token.cancelled() => {}
    }

    // Stop accepting requests, then drain turn workers.
    server.shutdown().shutdown();
    if let Err(e) = tokio::time::timeout(Duration::from_secs(10), server_handle).await {
        error!(error = %e, "http server did not stop in time");
    }
    runtime.shutdown(DRAIN_DEADLINE).await;
    info!("shutdown complete");

    Ok(())
}
