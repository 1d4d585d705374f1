//! Wiring shared by both operation modes.

use std::sync::Arc;

use anyhow::Context;
use tft_bridge_chain::{
    solana::{load_keypair_file, SolanaEndpoints},
    DestinationChain, EvmChain, SolanaChain,
};
use tft_bridge_p2p_service::{
    config::{parse_psk, parse_relay},
    identity::keypair_from_stellar_seed,
    BootstrapHandles, Configuration,
};
use tft_bridge_stellar::{Horizon, HorizonClient, TxMemory, VaultKeypair, VaultWallet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::{Config, DestinationConfig},
    constants::SHUTDOWN_TIMEOUT,
};

pub(crate) mod follower;
pub(crate) mod leader;

/// Connects to Horizon and opens the vault with this node's key.
///
/// The returned wallet cannot submit until a signature collector is attached.
pub(crate) async fn open_vault(
    config: &Config,
    cancel: &CancellationToken,
) -> anyhow::Result<(Arc<dyn Horizon>, VaultWallet)> {
    let network = config.network()?;
    let horizon: Arc<dyn Horizon> = Arc::new(HorizonClient::new(config.horizon_url()?)?);
    let keypair = VaultKeypair::from_seed(&config.stellar_seed)?;

    let memory = Arc::new(
        TxMemory::new(horizon.clone(), config.master_address.as_str(), network)
            .with_cancel(cancel.clone()),
    );
    let indexed = memory.scan().await.context("initial scan of the vault")?;
    info!(vault = %config.master_address, signer = %keypair.address(), indexed, "opened vault");

    let wallet = VaultWallet::new(
        horizon.clone(),
        memory,
        keypair,
        config.master_address.as_str(),
        config.stellar_fee_wallet.as_str(),
    );
    Ok((horizon, wallet))
}

/// Connects to the configured destination chain.
pub(crate) async fn connect_chain(config: &Config) -> anyhow::Result<Arc<dyn DestinationChain>> {
    let chain: Arc<dyn DestinationChain> = match &config.destination {
        DestinationConfig::Evm {
            destination_url,
            contract_address,
            eth_private_key,
        } => Arc::new(EvmChain::connect(destination_url, contract_address, eth_private_key).await?),
        DestinationConfig::Solana {
            destination_url,
            token_program_address,
            solana_key_file,
            solana_network,
        } => {
            let key = load_keypair_file(solana_key_file)?;
            let endpoints = SolanaEndpoints::resolve(*solana_network, destination_url.as_deref());
            Arc::new(SolanaChain::new(endpoints, token_program_address, key)?)
        }
    };
    info!(kind = %chain.kind(), address = %chain.own_address(), "connected to destination chain");
    Ok(chain)
}

/// The overlay configuration of this node.
pub(crate) fn overlay_config(config: &Config) -> anyhow::Result<Configuration> {
    let keypair = keypair_from_stellar_seed(&config.stellar_seed)?;
    let (relay, _) = parse_relay(&config.relay)?;
    let psk = parse_psk(&config.psk)?;
    Ok(Configuration::new(
        keypair,
        config.listen_addr()?,
        Some(relay),
        Some(psk),
    ))
}

/// Stops the overlay and waits for its task to finish.
pub(crate) async fn stop_overlay(overlay: BootstrapHandles) {
    overlay.cancel.cancel();
    match timeout(SHUTDOWN_TIMEOUT, overlay.listen_task).await {
        Ok(Ok(())) => info!("overlay stopped"),
        Ok(Err(e)) => warn!(%e, "overlay task failed"),
        Err(_) => warn!("overlay did not stop in time"),
    }
}
