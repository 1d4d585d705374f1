//! Deposit loop: vault deposits become mints, or refunds when they cannot be minted.

use std::collections::HashSet;

use tft_bridge_common::retry::{retry_until_cancelled, sleep_or_cancel, Cancelled};
use tft_bridge_primitives::{
    constants::{CURSOR_RETRY_DELAY, RETRY_DELAY},
    memo::MemoKey,
    types::{Deposit, MintRequest, SignerResponse, SigningRequest},
};
use tft_bridge_stellar::{
    errors::{HorizonResult, StellarError},
    horizon::{fetch_page, PageLimit, TransactionRecord},
    SettlementKind, SubmitOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::Leader;
use crate::{
    collector::mint_signatures,
    errors::{AgentError, AgentResult},
};

impl Leader {
    pub(super) async fn run_deposits(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut cursor = if self.config.rescan {
            info!(action = "rescanning the vault from the start");
            String::new()
        } else {
            match self.cursors.load() {
                Ok(cursors) => cursors.stellar_cursor,
                Err(e) => {
                    warn!(%e, "could not read the stellar cursor, scanning from the start");
                    String::new()
                }
            }
        };
        if cursor.is_empty() {
            cursor = "0".to_string();
        }
        info!(%cursor, "watching vault deposits");

        loop {
            cursor = self.sync_deposits(cursor, cancel).await?;
            sleep_or_cancel(cancel, self.config.poll_interval).await?;
        }
    }

    /// Handles every vault transaction after `cursor` and returns the cursor of the last one.
    pub async fn sync_deposits(
        &self,
        mut cursor: String,
        cancel: &CancellationToken,
    ) -> Result<String, Cancelled> {
        loop {
            let records = retry_until_cancelled(
                cancel,
                CURSOR_RETRY_DELAY,
                "fetch vault transactions",
                || self.fetch_vault_page(&cursor, cancel),
            )
            .await?;
            if records.is_empty() {
                return Ok(cursor);
            }

            for record in &records {
                self.handle_deposit(record, cancel).await?;
                cursor = record.paging_token.clone();
                if let Err(e) = self.cursors.save_stellar_cursor(&cursor) {
                    error!(%e, %cursor, "could not persist the stellar cursor");
                }
            }
        }
    }

    async fn fetch_vault_page(
        &self,
        cursor: &str,
        cancel: &CancellationToken,
    ) -> HorizonResult<Vec<TransactionRecord>> {
        let mut limit = PageLimit::default();
        fetch_page(
            self.horizon.as_ref(),
            self.wallet.vault_address(),
            cursor,
            &mut limit,
            cancel,
        )
        .await
    }

    /// Settles one vault transaction, retrying until it is minted, refunded or cancelled.
    pub async fn handle_deposit(
        &self,
        record: &TransactionRecord,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if !record.successful {
            debug!(tx_hash = %record.hash, "skipping failed transaction");
            return Ok(());
        }
        if record.source_account == self.wallet.vault_address() {
            trace!(tx_hash = %record.hash, "skipping outgoing vault transaction");
            return Ok(());
        }

        let deposit = retry_until_cancelled(cancel, RETRY_DELAY, "read deposit", || {
            self.wallet.deposit(record)
        })
        .await?;
        if deposit.amount == 0 {
            debug!(tx_hash = %deposit.tx_hash, "transaction credited no TFT to the vault");
            return Ok(());
        }

        info!(event = "received deposit", tx_hash = %deposit.tx_hash, amount = deposit.amount, sender = %deposit.sender);
        retry_until_cancelled(cancel, RETRY_DELAY, "settle deposit", || {
            self.settle_deposit(&deposit)
        })
        .await
    }

    /// One attempt at minting a deposit and collecting its fee, or refunding it.
    async fn settle_deposit(&self, deposit: &Deposit) -> AgentResult<()> {
        let _guard = self.settlement.lock().await;

        if deposit.amount <= self.config.deposit_fee {
            let err = AgentError::InsufficientDepositAmount {
                amount: deposit.amount,
                fee: self.config.deposit_fee,
            };
            warn!(tx_hash = %deposit.tx_hash, %err, "refunding deposit");
            return self.refund(deposit).await;
        }

        let Some(memo) = &deposit.memo else {
            warn!(tx_hash = %deposit.tx_hash, "deposit has no memo, refunding");
            return self.refund(deposit).await;
        };
        let receiver = match self.chain.validate_receiver(memo).await {
            Ok(receiver) => receiver,
            Err(e) if e.kind().triggers_refund() => {
                warn!(tx_hash = %deposit.tx_hash, %e, "deposit memo is not a usable receiver, refunding");
                return self.refund(deposit).await;
            }
            Err(e) => return Err(e.into()),
        };

        if self.chain.is_settled(&deposit.tx_hash).await? {
            info!(tx_hash = %deposit.tx_hash, "deposit was already minted");
        } else {
            match self.mint(deposit, receiver).await {
                Ok(mint_tx) => {
                    info!(event = "minted deposit", tx_hash = %deposit.tx_hash, %mint_tx);
                }
                Err(e) if e.kind().triggers_refund() => {
                    warn!(tx_hash = %deposit.tx_hash, %e, "mint refused, refunding");
                    return self.refund(deposit).await;
                }
                Err(e) => return Err(e),
            }
        }

        self.collect_deposit_fee(deposit).await
    }

    /// Builds the mint of `deposit`, gathers cosigner signatures for it and submits it.
    async fn mint(&self, deposit: &Deposit, receiver: String) -> AgentResult<String> {
        if !self.chain.is_synced().await? {
            return Err(AgentError::NotSynced);
        }

        let amount = deposit.amount - self.config.deposit_fee;
        let required = self.chain.required_signatures().await?;
        let cosigners = self.wallet.cosigners().await?;

        let request = MintRequest {
            receiver,
            amount,
            deposit_tx_hash: deposit.tx_hash.clone(),
            required_signatures: required,
            encoded_mint_tx: None,
        };
        let online: Vec<String> = if self.chain.needs_signer_ids() {
            self.fanout
                .destination_ids(&cosigners)
                .await
                .into_iter()
                .map(|(_, id)| id)
                .collect()
        } else {
            Vec::new()
        };
        let request = self.chain.prepare_mint(request, &online).await?;

        info!(action = "collecting mint signatures", tx_hash = %deposit.tx_hash, receiver = %request.receiver, amount, required);
        let signer_set = self.chain.ordered_signer_set().await?;
        let mut signed = HashSet::new();
        let responses = self
            .fanout
            .collect_verified(
                SigningRequest::Mint(request.clone()),
                &cosigners,
                required,
                |_, response| match response {
                    SignerResponse::Mint(sig) => {
                        self.chain
                            .check_mint_signature(&request, &signer_set, sig)
                            .is_ok()
                            && signed.insert(sig.signer_address.clone())
                    }
                    SignerResponse::Stellar(_) => false,
                },
            )
            .await?;

        let tx = self
            .chain
            .assemble_and_submit(&request, mint_signatures(responses))
            .await?;
        Ok(tx)
    }

    async fn refund(&self, deposit: &Deposit) -> AgentResult<()> {
        match self.wallet.refund(deposit).await? {
            SubmitOutcome::Submitted { hash } => {
                info!(event = "refunded deposit", tx_hash = %deposit.tx_hash, refund = %hash);
            }
            SubmitOutcome::AlreadySettled => {
                info!(tx_hash = %deposit.tx_hash, "deposit was already refunded");
            }
            SubmitOutcome::Unreachable => {
                warn!(tx_hash = %deposit.tx_hash, sender = %deposit.sender, "sender cannot receive the refund");
            }
            SubmitOutcome::Skipped => {}
        }
        Ok(())
    }

    async fn collect_deposit_fee(&self, deposit: &Deposit) -> AgentResult<()> {
        let key = MemoKey::from_hex(&deposit.tx_hash).map_err(StellarError::from)?;
        let outcome = self
            .wallet
            .transfer_fee(self.config.deposit_fee, key, SettlementKind::FeeTransfer)
            .await?;
        match outcome {
            SubmitOutcome::Submitted { hash } => {
                info!(event = "collected deposit fee", tx_hash = %deposit.tx_hash, fee_tx = %hash);
            }
            other => debug!(tx_hash = %deposit.tx_hash, ?other, "deposit fee not transferred"),
        }
        Ok(())
    }
}
