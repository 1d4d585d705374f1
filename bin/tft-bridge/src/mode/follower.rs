//! Follower mode: answers the leader's signing requests over the overlay.

use std::sync::Arc;

use tft_bridge_agent::Follower;
use tft_bridge_p2p_service::{bootstrap as start_overlay, SignerService};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{connect_chain, open_vault, overlay_config, stop_overlay};
use crate::config::Config;

/// Starts the follower and serves signing requests until `cancel` fires.
pub(crate) async fn bootstrap(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    info!("bootstrapping follower node");

    let (_horizon, wallet) = open_vault(&config, &cancel).await?;
    let chain = connect_chain(&config).await?;
    let follower: Arc<dyn SignerService> = Arc::new(Follower::new(
        wallet,
        chain,
        config.deposit_fee_stroops()?,
    ));

    let overlay = start_overlay(&overlay_config(&config)?, Some(follower)).await?;
    info!(peer_id = %overlay.handler.local_peer_id(), "serving signing requests");

    cancel.cancelled().await;
    stop_overlay(overlay).await;
    Ok(())
}
