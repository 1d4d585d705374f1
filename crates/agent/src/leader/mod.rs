//! The leader drives every settlement of the bridge.
//!
//! Two loops run side by side: the deposit loop pages through the vault's transactions and mints
//! (or refunds) each deposit, and the withdraw loop follows the destination chain and pays out
//! each burn from the vault. Submissions of both loops are serialised by one settlement lock so
//! that the vault's sequence number is never used twice.

use std::{sync::Arc, time::Duration};

use tft_bridge_chain::DestinationChain;
use tft_bridge_common::retry::Cancelled;
use tft_bridge_db::CursorStore;
use tft_bridge_p2p_service::SignerFanout;
use tft_bridge_primitives::constants::{CURSOR_RETRY_DELAY, DEFAULT_DEPOSIT_FEE_TFT, STROOPS_PER_TFT};
use tft_bridge_stellar::{Horizon, VaultWallet};
use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod deposit;
mod withdraw;

/// Tunables of the leader.
#[derive(Debug, Clone)]
pub struct LeaderConfig {
    /// Deposit fee in stroops.
    pub deposit_fee: u64,

    /// Restart the vault scan from the beginning of its history.
    pub rescan: bool,

    /// Restart the withdraw scan from this destination-chain height when non-zero.
    pub rescan_height: u64,

    /// Pause between two vault scans that found nothing new.
    pub poll_interval: Duration,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            deposit_fee: DEFAULT_DEPOSIT_FEE_TFT * STROOPS_PER_TFT,
            rescan: false,
            rescan_height: 0,
            poll_interval: CURSOR_RETRY_DELAY,
        }
    }
}

/// The single node that proposes settlements.
#[derive(Debug)]
pub struct Leader {
    horizon: Arc<dyn Horizon>,
    wallet: VaultWallet,
    chain: Arc<dyn DestinationChain>,
    fanout: SignerFanout,
    cursors: Arc<CursorStore>,
    config: LeaderConfig,

    /// Held while a settlement is built, signed and submitted.
    settlement: Mutex<()>,
}

impl Leader {
    /// Creates a leader.
    ///
    /// `wallet` must carry a signature collector; `fanout` is used for mint signatures.
    pub fn new(
        horizon: Arc<dyn Horizon>,
        wallet: VaultWallet,
        chain: Arc<dyn DestinationChain>,
        fanout: SignerFanout,
        cursors: Arc<CursorStore>,
        config: LeaderConfig,
    ) -> Self {
        Self {
            horizon,
            wallet,
            chain,
            fanout,
            cursors,
            config,
            settlement: Mutex::new(()),
        }
    }

    /// The leader's vault wallet.
    pub const fn wallet(&self) -> &VaultWallet {
        &self.wallet
    }

    /// Runs the deposit and the withdraw loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            vault = %self.wallet.vault_address(),
            chain = %self.chain.kind(),
            deposit_fee = self.config.deposit_fee,
            "starting leader"
        );

        let mut loops = JoinSet::new();
        {
            let leader = self.clone();
            let cancel = cancel.clone();
            loops.spawn(async move { leader.run_deposits(&cancel).await });
        }
        {
            let leader = self.clone();
            let cancel = cancel.clone();
            loops.spawn(async move { leader.run_withdraws(&cancel).await });
        }

        while let Some(result) = loops.join_next().await {
            match result {
                Ok(Err(Cancelled)) | Ok(Ok(())) => {}
                Err(e) => {
                    error!(%e, "leader loop panicked, stopping");
                    cancel.cancel();
                }
            }
        }
        info!("leader stopped");
    }
}
