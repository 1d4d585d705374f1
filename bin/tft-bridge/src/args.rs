//! Parses command-line arguments of the bridge node.

use std::{fmt::Display, path::PathBuf};

use clap::{crate_version, Parser, ValueEnum};

#[derive(Debug, Parser)]
#[clap(
    name = "tft-bridge",
    about = "Bridge node moving TFT between Stellar and a destination chain",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[arg(
        value_enum,
        help = "Run as `leader` or `follower`; defaults to the `follower` key of the config"
    )]
    pub mode: Option<OperationMode>,

    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration of the node",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[clap(long, help = "Rescan the vault from its first transaction")]
    pub rescan: bool,

    #[clap(long, help = "Destination-chain height to rescan withdraws from")]
    pub rescan_height: Option<u64>,

    #[clap(long, help = "Log at debug level unless RUST_LOG is set")]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OperationMode {
    /// Watch both chains and propose every settlement.
    Leader,

    /// Validate and sign what the leader proposes.
    Follower,
}

impl Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Leader => write!(f, "leader"),
            OperationMode::Follower => write!(f, "follower"),
        }
    }
}
