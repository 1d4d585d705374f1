//! Leader mode: watches both chains and drives every settlement.

use std::sync::Arc;

use tft_bridge_agent::{FanoutCollector, Leader, LeaderConfig};
use tft_bridge_db::CursorStore;
use tft_bridge_p2p_service::{bootstrap as start_overlay, SignerFanout};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{connect_chain, open_vault, overlay_config, stop_overlay};
use crate::config::Config;

/// Starts the leader and runs it until `cancel` fires.
pub(crate) async fn bootstrap(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    info!("bootstrapping leader node");

    let cursors = Arc::new(CursorStore::new(&config.persistency_file));
    cursors.ensure_writable()?;

    let (horizon, wallet) = open_vault(&config, &cancel).await?;
    let chain = connect_chain(&config).await?;

    let overlay = start_overlay(&overlay_config(&config)?, None).await?;
    info!(peer_id = %overlay.handler.local_peer_id(), "joined the signer overlay");

    let fanout = SignerFanout::new(Arc::new(overlay.handler.clone()));
    let wallet = wallet.with_collector(Arc::new(FanoutCollector::new(fanout.clone())));
    let leader_config = LeaderConfig {
        deposit_fee: config.deposit_fee_stroops()?,
        rescan: config.rescan,
        rescan_height: config.rescan_height,
        ..LeaderConfig::default()
    };

    let leader = Arc::new(Leader::new(
        horizon,
        wallet,
        chain,
        fanout,
        cursors,
        leader_config,
    ));
    leader.run(cancel).await;

    stop_overlay(overlay).await;
    Ok(())
}
