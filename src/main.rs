//! ipcap - IPC packet acquisition engine
//!
//! Entry point wiring configuration, runmode selection, and graceful
//! shutdown around the acquisition thread graph.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![warn(unused_must_use)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ipcap::acquisition::transport::{CaptureTransport, LoopbackTransport};
use ipcap::config::Config;
use ipcap::errors::ConfigError;
use ipcap::runmode::{self, Runmode, Topology};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ipcap.toml")]
    config: String,

    /// Runmode override (single, autofp, workers)
    #[arg(short, long)]
    runmode: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    info!("starting ipcap acquisition engine");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let topology = resolve_topology(args.runmode.as_deref().or(config.runmode.mode.as_deref()));
    info!(mode = %topology, "selected runmode");

    let transport = build_transport(&config)?;
    let engine = Runmode::new(config, transport);

    let graph = match engine.run(topology) {
        Ok(graph) => graph,
        Err(err) => {
            error!(error = %err, "runmode start failed");
            return Err(err.into());
        }
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to install shutdown handler")?;
    info!("shutdown signal received");

    let snapshot = tokio::task::spawn_blocking(move || graph.stop())
        .await
        .context("teardown task failed")??;
    info!(
        packets = snapshot.packets_received,
        logged = snapshot.packets_logged,
        "engine stopped"
    );

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "ipcap=debug,info"
    } else {
        "ipcap=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("failed to load config from {}", path))
    } else {
        warn!("config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}

/// Map the requested mode name to a topology, falling back to the
/// documented default on an unknown name.
fn resolve_topology(requested: Option<&str>) -> Topology {
    match requested {
        None => runmode::default_mode(),
        Some(name) => name.parse().unwrap_or_else(|err: ConfigError| {
            warn!(error = %err, default = %runmode::default_mode(), "falling back to default runmode");
            runmode::default_mode()
        }),
    }
}

/// Select the transport backend named by the configuration
fn build_transport(config: &Config) -> Result<Arc<dyn CaptureTransport>> {
    match config.ipc.transport.as_str() {
        "loopback" => Ok(Arc::new(LoopbackTransport::default())),
        other => Err(ConfigError::InvalidValue {
            key: "ipc.transport",
            reason: format!("unknown transport backend '{}'", other),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_topology_default() {
        assert_eq!(resolve_topology(None), Topology::AutoFp);
    }

    #[test]
    fn test_resolve_topology_known() {
        assert_eq!(resolve_topology(Some("workers")), Topology::Workers);
    }

    #[test]
    fn test_resolve_topology_unknown_falls_back() {
        assert_eq!(resolve_topology(Some("bogus")), Topology::AutoFp);
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let mut config = Config::default();
        config.ipc.transport = "quic".to_string();
        assert!(build_transport(&config).is_err());
    }
}
