use std::path::PathBuf;

use anyhow::{bail, ensure, Context};
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use tft_bridge_chain::solana::SolanaNetwork;
use tft_bridge_p2p_service::config::{parse_psk, parse_relay};
use tft_bridge_primitives::{
    constants::{DEFAULT_DEPOSIT_FEE_TFT, STROOPS_PER_TFT},
    network::StellarNetwork,
};
use tft_bridge_stellar::{keys::is_valid_address, VaultKeypair};

use crate::constants::DEFAULT_LISTEN_ADDR;

/// The configuration of a bridge node.
///
/// Every node of a bridge must agree on the network, the vault, the fee wallet and the deposit
/// fee; followers refuse settlements that disagree with their own values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// `testnet` or `production`.
    pub stellar_network: String,

    /// Secret seed of this node's vault signer key, which is also its overlay identity.
    pub stellar_seed: String,

    /// Account receiving withdraw and deposit fees.
    pub stellar_fee_wallet: String,

    /// The vault account.
    pub master_address: String,

    /// Horizon endpoint overriding the network default.
    #[serde(default)]
    pub horizon_url: Option<String>,

    /// The cursor file.
    pub persistency_file: PathBuf,

    /// Rescan the vault from its first transaction.
    #[serde(default)]
    pub rescan: bool,

    /// Destination-chain height to rescan withdraws from; 0 resumes from the cursor file.
    #[serde(default)]
    pub rescan_height: u64,

    /// Run as a follower.
    #[serde(default)]
    pub follower: bool,

    /// Multiaddr of the overlay relay, ending in its `/p2p/` peer id.
    pub relay: String,

    /// Hex pre-shared key of the overlay.
    pub psk: String,

    /// Overlay listen address.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Deposit fee in whole TFT.
    #[serde(default = "default_deposit_fee")]
    pub deposit_fee: u64,

    /// The destination chain.
    pub destination: DestinationConfig,
}

const fn default_deposit_fee() -> u64 {
    DEFAULT_DEPOSIT_FEE_TFT
}

/// Connection details of the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum DestinationConfig {
    /// The multisig token contract on an EVM chain.
    Evm {
        /// Websocket endpoint of the node.
        destination_url: String,

        /// Address of the token contract.
        contract_address: String,

        /// Hex private key of this node's contract signer.
        eth_private_key: String,
    },

    /// A token-2022 mint on Solana.
    Solana {
        /// RPC endpoint overriding the cluster default.
        #[serde(default)]
        destination_url: Option<String>,

        /// Address of the bridged mint.
        token_program_address: String,

        /// JSON keypair file of this node's multisig member key.
        solana_key_file: PathBuf,

        /// The cluster.
        #[serde(default)]
        solana_network: SolanaNetwork,
    },
}

impl Config {
    /// Parses a TOML config.
    pub(crate) fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("config is not valid TOML")
    }

    /// Checks every value that can be checked without network access.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        self.network()?;
        VaultKeypair::from_seed(&self.stellar_seed).context("stellar_seed")?;
        ensure!(
            is_valid_address(&self.stellar_fee_wallet),
            "stellar_fee_wallet {} is not a stellar address",
            self.stellar_fee_wallet
        );
        ensure!(
            is_valid_address(&self.master_address),
            "master_address {} is not a stellar address",
            self.master_address
        );
        parse_psk(&self.psk).context("psk")?;
        parse_relay(&self.relay).context("relay")?;
        self.listen_addr()?;
        ensure!(self.deposit_fee > 0, "deposit_fee must be positive");
        self.deposit_fee_stroops()?;

        match &self.destination {
            DestinationConfig::Evm {
                destination_url,
                contract_address,
                eth_private_key,
            } => {
                ensure!(!destination_url.is_empty(), "destination_url is empty");
                ensure!(!contract_address.is_empty(), "contract_address is empty");
                ensure!(!eth_private_key.is_empty(), "eth_private_key is empty");
            }
            DestinationConfig::Solana {
                token_program_address,
                solana_key_file,
                ..
            } => {
                ensure!(
                    !token_program_address.is_empty(),
                    "token_program_address is empty"
                );
                ensure!(
                    !solana_key_file.as_os_str().is_empty(),
                    "solana_key_file is empty"
                );
            }
        }
        Ok(())
    }

    pub(crate) fn network(&self) -> anyhow::Result<StellarNetwork> {
        match self.stellar_network.parse() {
            Ok(network) => Ok(network),
            Err(e) => bail!("stellar_network: {e}"),
        }
    }

    pub(crate) fn horizon_url(&self) -> anyhow::Result<String> {
        Ok(match &self.horizon_url {
            Some(url) => url.clone(),
            None => self.network()?.horizon_url().to_string(),
        })
    }

    pub(crate) fn listen_addr(&self) -> anyhow::Result<Multiaddr> {
        let addr = self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        addr.parse()
            .with_context(|| format!("listen_addr {addr} is not a multiaddr"))
    }

    pub(crate) fn deposit_fee_stroops(&self) -> anyhow::Result<u64> {
        self.deposit_fee
            .checked_mul(STROOPS_PER_TFT)
            .context("deposit_fee is too large")
    }
}
