//! Withdraw loop: matured burns on the destination chain are paid out from the vault.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicU64, Ordering},
};

use tft_bridge_chain::ChainEvent;
use tft_bridge_common::retry::{retry_until_cancelled, sleep_or_cancel, Cancelled};
use tft_bridge_primitives::{
    constants::{BRIDGE_NETWORK, RETRY_DELAY, WITHDRAW_FEE},
    types::BurnEvent,
};
use tft_bridge_stellar::{SettlementKind, SubmitOutcome};
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Leader;
use crate::errors::AgentResult;

/// Capacity of the channel between the chain watcher and the withdraw loop.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Block height and event id of a burn.
type PendingKey = (u64, String);

/// Burns waiting to mature, ordered by block.
type Pending = BTreeMap<PendingKey, BurnEvent>;

impl Leader {
    pub(super) async fn run_withdraws(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let start = self.withdraw_start_height(cancel).await?;
        info!(
            from_height = start,
            maturation_delay = self.chain.maturation_delay(),
            "watching withdraws"
        );

        let resume = AtomicU64::new(start);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Both halves stop on `cancel`; the watcher must finish to release its subscription.
        let (watched, processed) = tokio::join!(
            self.watch_chain(&resume, events_tx, cancel),
            self.process_withdraws(&resume, events_rx, cancel),
        );
        watched.and(processed)
    }

    async fn withdraw_start_height(&self, cancel: &CancellationToken) -> Result<u64, Cancelled> {
        let delay = self.chain.maturation_delay();
        if self.config.rescan_height > 0 {
            info!(height = self.config.rescan_height, "rescanning withdraws");
            return Ok(self.config.rescan_height.saturating_sub(delay));
        }

        let persisted = match self.cursors.load() {
            Ok(cursors) => cursors.last_height,
            Err(e) => {
                warn!(%e, "could not read the last handled height");
                0
            }
        };
        if persisted > 0 {
            return Ok(persisted.saturating_sub(delay));
        }

        retry_until_cancelled(cancel, RETRY_DELAY, "read destination chain head", || {
            self.chain.head()
        })
        .await
    }

    /// Keeps a subscription to the chain open, resubscribing from `resume` when it breaks.
    async fn watch_chain(
        &self,
        resume: &AtomicU64,
        events: mpsc::Sender<ChainEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        loop {
            let from = resume.load(Ordering::Relaxed);
            debug!(from_height = from, "subscribing to withdraw events");
            match self
                .chain
                .watch_events(from, events.clone(), cancel.clone())
                .await
            {
                Ok(()) if cancel.is_cancelled() => return Err(Cancelled),
                Ok(()) => warn!("withdraw subscription ended, resubscribing"),
                Err(e) => warn!(%e, "withdraw subscription failed, resubscribing"),
            }
            sleep_or_cancel(cancel, RETRY_DELAY).await?;
        }
    }

    async fn process_withdraws(
        &self,
        resume: &AtomicU64,
        mut events: mpsc::Receiver<ChainEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let mut pending = Pending::new();
        let mut failed = BTreeSet::new();
        let mut head = resume.load(Ordering::Relaxed);
        let mut retry = interval_at(Instant::now() + RETRY_DELAY, RETRY_DELAY);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let retrying = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                event = events.recv() => {
                    match event {
                        Some(ChainEvent::Withdraw(event)) => {
                            if event.network.as_deref().is_some_and(|n| n != BRIDGE_NETWORK) {
                                warn!(event_id = %event.event_id, network = ?event.network, "ignoring withdraw to another network");
                                continue;
                            }
                            info!(event = "received withdraw", event_id = %event.event_id, block = event.block_height, amount = event.amount, receiver = %event.memo);
                            pending.insert((event.block_height, event.event_id.clone()), event);
                        }
                        Some(ChainEvent::Head(height)) => head = head.max(height),
                        None => return Err(Cancelled),
                    }
                    false
                }
                _ = retry.tick() => true,
            };

            // Burns that failed wait for the next tick.
            if retrying {
                failed.clear();
            }
            if !pending.is_empty() {
                self.settle_matured(&mut pending, &mut failed, head, cancel)
                    .await?;
            }

            let handled = pending
                .keys()
                .next()
                .map_or(head, |(block, _)| block.saturating_sub(1));
            if resume.swap(handled, Ordering::Relaxed) != handled {
                if let Err(e) = self.cursors.save_height(handled) {
                    error!(%e, height = handled, "could not persist the last handled height");
                }
            }
        }
    }

    /// Pays out every pending burn buried under enough blocks.
    ///
    /// Burns that fail stay pending and are added to `failed`, which this call skips.
    async fn settle_matured(
        &self,
        pending: &mut Pending,
        failed: &mut BTreeSet<PendingKey>,
        head: u64,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let delay = self.chain.maturation_delay();
        let matured: Vec<_> = pending
            .keys()
            .filter(|(block, _)| delay == 0 || head >= block.saturating_add(delay))
            .filter(|key| !failed.contains(*key))
            .cloned()
            .collect();
        if matured.is_empty() {
            return Ok(());
        }

        match self.chain.is_synced().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("destination chain is not synced, holding withdraws");
                return Ok(());
            }
            Err(e) => {
                warn!(%e, "could not check the destination chain sync state");
                return Ok(());
            }
        }

        for key in matured {
            let Some(event) = pending.get(&key) else {
                continue;
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                res = self.handle_withdraw(event) => res,
            };
            match result {
                Ok(()) => {
                    pending.remove(&key);
                }
                Err(e) => {
                    warn!(event_id = %key.1, %e, retry_in = ?RETRY_DELAY, "withdraw not settled");
                    failed.insert(key);
                }
            }
        }
        Ok(())
    }

    /// Pays out one burn from the vault.
    ///
    /// Burns to the vault or the fee wallet are kept. Burns that do not cover the withdraw fee
    /// go to the fee wallet in full.
    pub async fn handle_withdraw(&self, event: &BurnEvent) -> AgentResult<()> {
        if event.memo == self.wallet.vault_address() || event.memo == self.wallet.fee_wallet() {
            warn!(event_id = %event.event_id, receiver = %event.memo, "withdraw to a bridge account, keeping the tokens");
            return Ok(());
        }
        if event.amount == 0 {
            debug!(event_id = %event.event_id, "withdraw of nothing");
            return Ok(());
        }

        let _guard = self.settlement.lock().await;
        let outcome = if event.amount <= WITHDRAW_FEE {
            info!(event_id = %event.event_id, amount = event.amount, "withdraw does not cover the fee, sending it to the fee wallet");
            let kind = SettlementKind::Withdraw {
                expected_receiver: event.caller.clone(),
                block_start: event.block_height,
            };
            self.wallet
                .transfer_fee(event.amount, event.short_id, kind)
                .await?
        } else {
            self.wallet
                .payout(
                    &event.memo,
                    event.amount,
                    event.short_id,
                    &event.caller,
                    event.block_height,
                )
                .await?
        };

        match outcome {
            SubmitOutcome::Submitted { hash } => {
                info!(event = "paid out withdraw", event_id = %event.event_id, tx_hash = %hash);
            }
            SubmitOutcome::AlreadySettled => {
                info!(event_id = %event.event_id, "withdraw was already paid out");
            }
            SubmitOutcome::Unreachable => {
                warn!(event_id = %event.event_id, receiver = %event.memo, "receiver cannot hold TFT, withdraw not paid out");
            }
            SubmitOutcome::Skipped => {
                warn!(event_id = %event.event_id, receiver = %event.memo, "withdraw skipped");
            }
        }
        Ok(())
    }
}
