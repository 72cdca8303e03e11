use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use ecosim_app::{ControlHandle, ControlServerConfig, serve};
use ecosim_core::{Coordinator, EcosystemConfig};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "ecosim-app",
    version,
    about = "Serve the ecosim predator-prey simulation over HTTP"
)]
struct Args {
    /// Address the REST control surface binds to.
    #[arg(long, env = "ECOSIM_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// JSON file holding a full or partial simulation configuration.
    #[arg(long, env = "ECOSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Side length of the square grid.
    #[arg(long, env = "ECOSIM_GRID_SIZE")]
    grid_size: Option<u32>,

    /// Seed for reproducible placement and worker decision streams.
    #[arg(long, env = "ECOSIM_SEED")]
    seed: Option<u64>,

    /// Milliseconds to wait for workers before failing an iteration.
    #[arg(long, env = "ECOSIM_ITERATION_TIMEOUT_MS")]
    iteration_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        grid_size = config.grid_size,
        seed = ?config.rng_seed,
        timeout_ms = config.iteration_timeout_ms,
        "Starting ecosim simulation server"
    );

    let coordinator = Coordinator::new(config).context("invalid simulation configuration")?;
    let handle = ControlHandle::new(Arc::new(Mutex::new(coordinator)));
    let server_config = ControlServerConfig {
        rest_address: args.listen,
    };
    serve(handle, server_config, shutdown_signal()).await?;
    info!("ecosim server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(args: &Args) -> Result<EcosystemConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str::<EcosystemConfig>(&data).with_context(|| {
                format!("config file {} did not contain valid JSON", path.display())
            })?
        }
        None => EcosystemConfig::default(),
    };
    if let Some(grid_size) = args.grid_size {
        config.grid_size = grid_size;
    }
    if let Some(seed) = args.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(timeout) = args.iteration_timeout_ms {
        config.iteration_timeout_ms = timeout;
    }
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
