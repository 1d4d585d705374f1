//! End-to-end settlement scenarios of a leader and its followers.

use std::time::Duration;

use tft_bridge_chain::test_utils::MintRecord;
use tft_bridge_common::retry::Cancelled;
use tft_bridge_p2p_service::{P2PError, SignerTransport};
use tft_bridge_primitives::{
    constants::{BRIDGE_NETWORK, STROOPS_PER_TFT, WITHDRAW_FEE},
    errors::RpcError,
    memo::{MemoKey, ShortId},
    types::{BurnEvent, DepositMemo, MintRequest, SigningRequest},
};
use tft_bridge_stellar::xdr::{envelope_payments, EnvelopeMemo};
use tokio_util::sync::CancellationToken;

use super::common::{wait_until, Bridge, DEPOSIT_FEE, RECEIVER};
use crate::LeaderConfig;

fn burn(bridge: &Bridge, amount: u64, block_height: u64) -> BurnEvent {
    BurnEvent {
        event_id: "0xburn".to_string(),
        caller: RECEIVER.to_string(),
        amount,
        memo: bridge.user.address().to_string(),
        block_height,
        short_id: ShortId::new([7; 32]),
        network: Some(BRIDGE_NETWORK.to_string()),
    }
}

#[tokio::test(start_paused = true)]
async fn deposit_is_minted_and_fee_collected() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        100 * STROOPS_PER_TFT,
        Some(DepositMemo::Text(RECEIVER.to_string())),
    );

    let leader = bridge.leader(Bridge::config());
    let cancel = CancellationToken::new();
    let cursor = leader.sync_deposits("0".to_string(), &cancel).await?;

    assert_eq!(
        bridge.ledger.mints(),
        vec![MintRecord {
            receiver: RECEIVER.to_string(),
            amount: 100 * STROOPS_PER_TFT - DEPOSIT_FEE,
            deposit_tx_hash: hash.clone(),
        }]
    );

    let fee = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Hash(MemoKey::from_hex(&hash)?));
    assert_eq!(fee.len(), 1);
    let payments = envelope_payments(&fee[0])?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].destination, bridge.fee_wallet);
    assert_eq!(payments[0].amount, DEPOSIT_FEE);

    assert_eq!(bridge.cursors.load()?.stellar_cursor, cursor);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn minted_deposit_only_collects_its_fee_after_a_restart() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        100 * STROOPS_PER_TFT,
        Some(DepositMemo::Text(RECEIVER.to_string())),
    );
    // The previous leader minted and stopped before moving the fee.
    bridge.ledger.record_mint(MintRecord {
        receiver: RECEIVER.to_string(),
        amount: 100 * STROOPS_PER_TFT - DEPOSIT_FEE,
        deposit_tx_hash: hash.clone(),
    });
    let fee_memo = EnvelopeMemo::Hash(MemoKey::from_hex(&hash)?);

    let leader = bridge.leader(Bridge::config());
    leader
        .sync_deposits("0".to_string(), &CancellationToken::new())
        .await?;

    assert_eq!(bridge.ledger.submissions(), 0);
    assert_eq!(bridge.ledger.mints().len(), 1);
    let fee = bridge.horizon.submitted_with_memo(&fee_memo);
    assert_eq!(fee.len(), 1);
    let payments = envelope_payments(&fee[0])?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].destination, bridge.fee_wallet);
    assert_eq!(payments[0].amount, DEPOSIT_FEE);

    let leader = bridge.leader(Bridge::config());
    leader
        .sync_deposits("0".to_string(), &CancellationToken::new())
        .await?;

    assert_eq!(bridge.ledger.submissions(), 0);
    assert_eq!(bridge.horizon.submitted_with_memo(&fee_memo).len(), 1);
    assert_eq!(bridge.horizon.submitted().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn small_deposit_is_refunded() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        40 * STROOPS_PER_TFT,
        Some(DepositMemo::Text(RECEIVER.to_string())),
    );

    let leader = bridge.leader(Bridge::config());
    leader
        .sync_deposits("0".to_string(), &CancellationToken::new())
        .await?;

    assert!(bridge.ledger.mints().is_empty());
    let refunds = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Return(MemoKey::from_hex(&hash)?));
    assert_eq!(refunds.len(), 1);
    let payments = envelope_payments(&refunds[0])?;
    assert_eq!(payments[0].destination, bridge.user.address());
    assert_eq!(payments[0].amount, 40 * STROOPS_PER_TFT - WITHDRAW_FEE);
    assert_eq!(payments[1].destination, bridge.fee_wallet);
    assert_eq!(payments[1].amount, WITHDRAW_FEE);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deposit_of_exactly_the_fee_is_refunded() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        DEPOSIT_FEE,
        Some(DepositMemo::Text(RECEIVER.to_string())),
    );

    let leader = bridge.leader(Bridge::config());
    leader
        .sync_deposits("0".to_string(), &CancellationToken::new())
        .await?;

    assert!(bridge.ledger.mints().is_empty());
    assert_eq!(bridge.ledger.submissions(), 0);
    let refunds = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Return(MemoKey::from_hex(&hash)?));
    assert_eq!(refunds.len(), 1);
    let payments = envelope_payments(&refunds[0])?;
    assert_eq!(payments[0].destination, bridge.user.address());
    assert_eq!(payments[0].amount, DEPOSIT_FEE - WITHDRAW_FEE);
    assert_eq!(payments[1].destination, bridge.fee_wallet);
    assert_eq!(payments[1].amount, WITHDRAW_FEE);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deposit_without_a_memo_is_refunded() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        100 * STROOPS_PER_TFT,
        None,
    );

    let leader = bridge.leader(Bridge::config());
    leader
        .sync_deposits("0".to_string(), &CancellationToken::new())
        .await?;

    assert!(bridge.ledger.mints().is_empty());
    assert_eq!(bridge.ledger.submissions(), 0);
    let refunds = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Return(MemoKey::from_hex(&hash)?));
    assert_eq!(refunds.len(), 1);
    let payments = envelope_payments(&refunds[0])?;
    assert_eq!(payments[0].destination, bridge.user.address());
    assert_eq!(payments[0].amount, 100 * STROOPS_PER_TFT - WITHDRAW_FEE);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deposit_without_a_receiver_is_refunded() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        100 * STROOPS_PER_TFT,
        Some(DepositMemo::Text("not an address".to_string())),
    );

    let leader = bridge.leader(Bridge::config());
    leader
        .sync_deposits("0".to_string(), &CancellationToken::new())
        .await?;

    assert!(bridge.ledger.mints().is_empty());
    let refunds = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Return(MemoKey::from_hex(&hash)?));
    assert_eq!(refunds.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn matured_withdraw_is_paid_out_once() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 3)?;
    let event = burn(&bridge, 10 * STROOPS_PER_TFT, 1000);
    let memo = EnvelopeMemo::Hash(event.short_id);

    let cancel = CancellationToken::new();
    let leader = bridge.leader(Bridge::config());
    let running = tokio::spawn(leader.run(cancel.clone()));

    bridge.ledger.emit_withdraw(event.clone());
    bridge.ledger.advance_head(1001);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(bridge.horizon.submitted_with_memo(&memo).is_empty());

    bridge.ledger.advance_head(1003);
    assert!(wait_until(|| !bridge.horizon.submitted_with_memo(&memo).is_empty()).await);

    let payout = bridge.horizon.submitted_with_memo(&memo);
    assert_eq!(payout.len(), 1);
    let payments = envelope_payments(&payout[0])?;
    assert_eq!(payments[0].destination, bridge.user.address());
    assert_eq!(payments[0].amount, 9 * STROOPS_PER_TFT);
    assert_eq!(payments[1].destination, bridge.fee_wallet);
    assert_eq!(payments[1].amount, WITHDRAW_FEE);
    assert!(wait_until(|| bridge.cursors.load().is_ok_and(|c| c.last_height == 1003)).await);

    cancel.cancel();
    running.await?;

    // A restarted leader replaying the same burn finds the payout on the vault.
    let cancel = CancellationToken::new();
    let config = LeaderConfig {
        rescan_height: 1000,
        ..Bridge::config()
    };
    let leader = bridge.leader(config);
    assert!(leader.handle_withdraw(&event).await.is_ok());
    let running = tokio::spawn(leader.run(cancel.clone()));

    bridge.ledger.emit_withdraw(event);
    bridge.ledger.advance_head(1004);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(bridge.horizon.submitted_with_memo(&memo).len(), 1);
    assert_eq!(bridge.horizon.submitted().len(), 1);

    cancel.cancel();
    running.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burn_below_the_fee_goes_to_the_fee_wallet() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let event = burn(&bridge, WITHDRAW_FEE / 2, 10);
    bridge.ledger.emit_withdraw(event.clone());

    let leader = bridge.leader(Bridge::config());
    leader.handle_withdraw(&event).await?;

    let sent = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Hash(event.short_id));
    assert_eq!(sent.len(), 1);
    let payments = envelope_payments(&sent[0])?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].destination, bridge.fee_wallet);
    assert_eq!(payments[0].amount, WITHDRAW_FEE / 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burn_of_exactly_the_fee_goes_to_the_fee_wallet() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let event = burn(&bridge, WITHDRAW_FEE, 10);
    bridge.ledger.emit_withdraw(event.clone());

    let leader = bridge.leader(Bridge::config());
    leader.handle_withdraw(&event).await?;

    let sent = bridge
        .horizon
        .submitted_with_memo(&EnvelopeMemo::Hash(event.short_id));
    assert_eq!(sent.len(), 1);
    let payments = envelope_payments(&sent[0])?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].destination, bridge.fee_wallet);
    assert_eq!(payments[0].amount, WITHDRAW_FEE);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failing_withdraw_waits_for_the_retry_delay() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |i| i != 2, 0)?;
    bridge
        .ledger
        .emit_withdraw(burn(&bridge, 10 * STROOPS_PER_TFT, 10));

    let cancel = CancellationToken::new();
    let leader = bridge.leader(Bridge::config());
    let running = tokio::spawn(leader.run(cancel.clone()));

    // New heads keep arriving; none of them may trigger a retry.
    for height in 11..61 {
        bridge.ledger.advance_head(height);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    cancel.cancel();
    running.await?;

    assert!(bridge.horizon.submitted().is_empty());
    // Tried when the burn arrived and on the ticks at 10s and 20s, asking both cosigners each time.
    assert_eq!(bridge.transport.calls(), 6);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn offline_cosigner_blocks_settlement() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |i| i != 2, 0)?;
    bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        100 * STROOPS_PER_TFT,
        Some(DepositMemo::Text(RECEIVER.to_string())),
    );

    let leader = bridge.leader(Bridge::config());
    let cancel = CancellationToken::new();
    let syncing = {
        let cancel = cancel.clone();
        tokio::spawn(async move { leader.sync_deposits("0".to_string(), &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    cancel.cancel();
    assert_eq!(syncing.await?, Err(Cancelled));

    assert!(bridge.ledger.mints().is_empty());
    assert_eq!(bridge.ledger.submissions(), 0);
    assert!(bridge.horizon.submitted().is_empty());
    // Attempts start at 0s, 10s and 20s and each asks both cosigners.
    assert_eq!(bridge.transport.calls(), 6);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inflated_mint_is_refused() -> anyhow::Result<()> {
    let bridge = Bridge::new(3, |_| true, 0)?;
    let hash = bridge.horizon.add_deposit(
        bridge.user.address(),
        bridge.vault(),
        100 * STROOPS_PER_TFT,
        Some(DepositMemo::Text(RECEIVER.to_string())),
    );

    let request = SigningRequest::Mint(MintRequest {
        receiver: RECEIVER.to_string(),
        amount: 1_000_000 * STROOPS_PER_TFT,
        deposit_tx_hash: hash,
        required_signatures: 2,
        encoded_mint_tx: None,
    });
    let refusal = bridge
        .transport
        .sign(bridge.keys[1].address(), request)
        .await
        .unwrap_err();
    match refusal {
        P2PError::Rejected(err) => assert_eq!(err, RpcError::invalid("amounts do not match")),
        other => panic!("unexpected error {other}"),
    }
    Ok(())
}
