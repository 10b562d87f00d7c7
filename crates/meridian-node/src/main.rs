//! Meridian node entry point.
//!
//! Starts a node with configuration from a TOML file or defaults.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use meridian_node::{MeridianConfig, MeridianNode};

/// Meridian Node
#[derive(Parser, Debug)]
#[command(name = "meridian-node", version, about = "Meridian routing node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "meridian.toml")]
    config: PathBuf,

    /// Run without network routing.
    #[arg(long)]
    offline: bool,

    /// Override the P2P listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(config: &MeridianConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        let config = MeridianConfig::default();
        config.save(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = MeridianConfig::load(&args.config)?;

    // Apply CLI overrides
    if args.offline {
        config.routing.offline = true;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(ref data_dir) = args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config);
    tracing::info!("Meridian node v{}", env!("CARGO_PKG_VERSION"));

    let mut node = MeridianNode::new(config)?;
    node.start().await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
    }

    node.shutdown().await?;
    tracing::info!("Meridian node exited cleanly");
    Ok(())
}
