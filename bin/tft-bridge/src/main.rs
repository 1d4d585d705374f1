//! The TFT bridge node moves TFT between a Stellar vault and a destination chain.

use std::{fs, path::Path, process::exit};

use anyhow::Context;
use args::{Cli, OperationMode};
use clap::Parser;
use config::Config;
use mode::{follower, leader};
use tft_bridge_common::{logging, logging::LoggerConfig};
use tokio::runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

mod args;
mod config;
mod constants;
mod mode;

fn main() {
    let cli = Cli::parse();
    logging::init(LoggerConfig::with_base_name("tft-bridge").with_debug(cli.debug));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(?e, "invalid configuration");
            exit(1);
        }
    };
    let mode = cli.mode.unwrap_or(if config.follower {
        OperationMode::Follower
    } else {
        OperationMode::Leader
    });
    info!(%mode, network = %config.stellar_network, vault = %config.master_address, "starting bridge node");

    let runtime = match runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(%e, "could not create the runtime");
            exit(1);
        }
    };

    let cancel = CancellationToken::new();
    runtime.spawn(shutdown_on_signal(cancel.clone()));

    let result = runtime.block_on(async move {
        match mode {
            OperationMode::Leader => leader::bootstrap(config, cancel).await,
            OperationMode::Follower => follower::bootstrap(config, cancel).await,
        }
    });
    if let Err(e) = result {
        error!(?e, "bridge node failed");
        exit(1);
    }

    info!("bridge node shutdown complete");
}

/// Reads the config file, applies the command-line overrides and validates the result.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = parse_toml(&cli.config)?;
    config.rescan |= cli.rescan;
    if let Some(height) = cli.rescan_height {
        config.rescan_height = height;
    }
    config.validate()?;
    Ok(config)
}

fn parse_toml(path: &Path) -> anyhow::Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    trace!(path = %path.display(), "read config file");

    let config = Config::from_toml(&contents)?;
    debug!(persistency_file = %config.persistency_file.display(), follower = config.follower, "parsed config file");
    Ok(config)
}

/// Cancels `cancel` on SIGINT or SIGTERM.
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(%e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => info!("received SIGINT, shutting down"),
            Err(e) => {
                warn!(%e, "cannot listen for SIGINT");
                return;
            }
        },
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
