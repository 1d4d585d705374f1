//! Solana variant: burns are token-2022 `BurnChecked` instructions of the bridged mint and mints
//! are one transaction signed by the online members of the mint's multisig authority.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod accounts;
pub mod burn;
mod chain;
pub mod programs;

pub use chain::{load_keypair_file, SolanaChain};

/// The Solana cluster a node talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolanaNetwork {
    /// A local test validator.
    Local,

    /// Devnet.
    Devnet,

    /// Testnet.
    #[default]
    Testnet,

    /// Mainnet beta.
    Production,
}

impl SolanaNetwork {
    /// The JSON-RPC endpoint of the cluster.
    pub const fn rpc_url(&self) -> &'static str {
        match self {
            SolanaNetwork::Local => "http://127.0.0.1:8899",
            SolanaNetwork::Devnet => "https://api.devnet.solana.com",
            SolanaNetwork::Testnet => "https://api.testnet.solana.com",
            SolanaNetwork::Production => "https://api.mainnet-beta.solana.com",
        }
    }

    /// The websocket endpoint of the cluster.
    pub const fn ws_url(&self) -> &'static str {
        match self {
            SolanaNetwork::Local => "ws://127.0.0.1:8900",
            SolanaNetwork::Devnet => "wss://api.devnet.solana.com",
            SolanaNetwork::Testnet => "wss://api.testnet.solana.com",
            SolanaNetwork::Production => "wss://api.mainnet-beta.solana.com",
        }
    }
}

impl fmt::Display for SolanaNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolanaNetwork::Local => "local",
            SolanaNetwork::Devnet => "devnet",
            SolanaNetwork::Testnet => "testnet",
            SolanaNetwork::Production => "production",
        };
        f.write_str(name)
    }
}

impl FromStr for SolanaNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(SolanaNetwork::Local),
            "devnet" => Ok(SolanaNetwork::Devnet),
            "testnet" => Ok(SolanaNetwork::Testnet),
            "production" | "mainnet" => Ok(SolanaNetwork::Production),
            other => Err(format!("unknown solana network: {other}")),
        }
    }
}

/// RPC and websocket endpoints of a Solana node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaEndpoints {
    /// JSON-RPC endpoint.
    pub rpc: String,

    /// Websocket endpoint for subscriptions.
    pub ws: String,
}

impl SolanaEndpoints {
    /// The endpoints of `network`, or of the node at `url` when one is configured.
    pub fn resolve(network: SolanaNetwork, url: Option<&str>) -> Self {
        match url {
            Some(url) => {
                let ws = if let Some(rest) = url.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = url.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    url.to_string()
                };
                Self {
                    rpc: url.to_string(),
                    ws,
                }
            }
            None => Self {
                rpc: network.rpc_url().to_string(),
                ws: network.ws_url().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_network() {
        let endpoints = SolanaEndpoints::resolve(SolanaNetwork::Devnet, None);
        assert_eq!(endpoints.rpc, "https://api.devnet.solana.com");
        assert_eq!(endpoints.ws, "wss://api.devnet.solana.com");
    }

    #[test]
    fn explicit_url_derives_websocket() {
        let endpoints = SolanaEndpoints::resolve(SolanaNetwork::Production, Some("http://node:8899"));
        assert_eq!(endpoints.rpc, "http://node:8899");
        assert_eq!(endpoints.ws, "ws://node:8899");
    }

    #[test]
    fn network_names() {
        assert_eq!("production".parse::<SolanaNetwork>().unwrap(), SolanaNetwork::Production);
        assert_eq!(SolanaNetwork::Local.to_string(), "local");
        assert!("moon".parse::<SolanaNetwork>().is_err());
    }
}
