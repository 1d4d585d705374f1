//! Follower side: re-derives every signing request from the chains before signing it.
//!
//! The follower never trusts the request body. Each request kind is checked against the vault's
//! transaction history and the destination chain; a request that does not match is refused with
//! an [`ErrorKind::InvalidRequest`](tft_bridge_primitives::errors::ErrorKind) error whose message
//! travels back to the leader verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use tft_bridge_chain::{DestinationChain, EventLookup};
use tft_bridge_p2p_service::SignerService;
use tft_bridge_primitives::{
    constants::{BRIDGE_NETWORK, WITHDRAW_FEE},
    errors::RpcError,
    memo::MemoKey,
    types::{
        DepositMemo, DestinationIdResponse, MintRequest, SignResponse, SignerResponse,
        SigningRequest,
    },
};
use tft_bridge_stellar::{
    horizon::RecordMemo,
    xdr::{decode_envelope, envelope_memo, envelope_payments, envelope_source, EnvelopeMemo, Payment},
    VaultWallet,
};
use tracing::{error, info, warn};

use crate::errors::{AgentError, AgentResult};

/// Validates and signs the leader's requests.
#[derive(Debug, Clone)]
pub struct Follower {
    wallet: VaultWallet,
    chain: Arc<dyn DestinationChain>,

    /// Deposit fee in stroops.
    deposit_fee: u64,
}

impl Follower {
    /// Creates a follower that signs with `wallet`'s key and `chain`'s key.
    pub fn new(wallet: VaultWallet, chain: Arc<dyn DestinationChain>, deposit_fee: u64) -> Self {
        Self {
            wallet,
            chain,
            deposit_fee,
        }
    }

    /// Validates `request` and returns this node's signature over it.
    pub async fn handle(&self, request: SigningRequest) -> AgentResult<SignerResponse> {
        match &request {
            SigningRequest::Mint(mint) => {
                info!(action = "validating mint", deposit = %mint.deposit_tx_hash, amount = mint.amount);
                self.validate_mint(mint).await?;
                let signature = self.chain.produce_partial_signature(mint).await?;
                info!(event = "signed mint", deposit = %mint.deposit_tx_hash);
                Ok(SignerResponse::Mint(signature))
            }
            SigningRequest::Withdraw {
                encoded_stellar_tx,
                expected_receiver,
                expected_block_start,
                ..
            } => {
                info!(action = "validating withdraw", receiver = %expected_receiver, block = expected_block_start);
                self.validate_withdraw(encoded_stellar_tx, expected_receiver, *expected_block_start)
                    .await?;
                self.cosign(encoded_stellar_tx)
            }
            SigningRequest::Refund {
                encoded_stellar_tx,
                original_deposit_tx_hash_hex,
                ..
            } => {
                info!(action = "validating refund", deposit = %original_deposit_tx_hash_hex);
                self.validate_refund(encoded_stellar_tx, original_deposit_tx_hash_hex)
                    .await?;
                self.cosign(encoded_stellar_tx)
            }
            SigningRequest::FeeTransfer {
                encoded_stellar_tx, ..
            } => {
                info!(action = "validating fee transfer");
                self.validate_fee_transfer(encoded_stellar_tx).await?;
                self.cosign(encoded_stellar_tx)
            }
        }
    }

    fn cosign(&self, encoded: &str) -> AgentResult<SignerResponse> {
        let signature: SignResponse = self.wallet.cosign(encoded)?;
        info!(event = "signed vault transaction", signer = %signature.signer_address);
        Ok(SignerResponse::Stellar(signature))
    }

    /// Checks a proposed mint against the deposit it claims to settle.
    pub async fn validate_mint(&self, request: &MintRequest) -> AgentResult<()> {
        let claim = self.chain.decode_mint(request)?;
        if claim.memo != request.deposit_tx_hash {
            return Err(AgentError::invalid("mint memo does not match the deposit"));
        }
        if claim.receiver != request.receiver {
            return Err(AgentError::invalid("mint receiver does not match the request"));
        }
        if claim.amount != request.amount {
            return Err(AgentError::invalid("amounts do not match"));
        }

        let deposit = self
            .wallet
            .memory()
            .get_tx(&request.deposit_tx_hash)
            .await?;
        if !deposit.successful {
            return Err(AgentError::invalid("deposit transaction failed"));
        }
        let memo = match deposit.memo {
            RecordMemo::Text(text) => DepositMemo::Text(text),
            RecordMemo::Hash(key) => DepositMemo::Hash(key),
            other => {
                warn!(deposit = %request.deposit_tx_hash, memo = ?other, "deposit memo cannot name a receiver");
                return Err(AgentError::invalid("deposit memo does not name a receiver"));
            }
        };
        let receiver = self.chain.receiver_from_memo(&memo)?;
        if receiver != request.receiver {
            return Err(AgentError::invalid("deposit addresses do not match"));
        }

        let (deposited, _sender) = self
            .wallet
            .get_deposit_amount_and_sender(&request.deposit_tx_hash)
            .await?;
        if deposited.checked_sub(self.deposit_fee) != Some(request.amount) {
            warn!(deposited, requested = request.amount, fee = self.deposit_fee, "mint amount mismatch");
            return Err(AgentError::invalid("amounts do not match"));
        }

        if self.chain.is_settled(&request.deposit_tx_hash).await? {
            return Err(AgentError::AlreadySettled(
                "deposit was already minted".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks a proposed payout against the burn it claims to settle.
    pub async fn validate_withdraw(
        &self,
        encoded: &str,
        expected_receiver: &str,
        block_start: u64,
    ) -> AgentResult<()> {
        let envelope = decode_envelope(encoded)?;
        self.require_vault_source(&envelope_source(&envelope)?)?;
        let EnvelopeMemo::Hash(short_id) = envelope_memo(&envelope)? else {
            return Err(AgentError::invalid("a withdraw needs a hash memo"));
        };

        let lookup = EventLookup {
            short_id,
            receiver: expected_receiver.to_string(),
            block_start,
        };
        let Some(event) = self.chain.find_event(&lookup).await? else {
            return Err(AgentError::invalid("no withdraw event found"));
        };
        if event.network.as_deref().is_some_and(|n| n != BRIDGE_NETWORK) {
            return Err(AgentError::invalid("withdraw targets another network"));
        }

        let memory = self.wallet.memory();
        if memory.memo_key_seen(&short_id).await? || memory.tx_exists(&envelope).await? {
            return Err(AgentError::AlreadySettled(
                "withdrawal already executed".to_string(),
            ));
        }

        let payments = self.tft_payments(&envelope_payments(&envelope)?)?;
        let fee_wallet = self.wallet.fee_wallet();

        if event.amount <= WITHDRAW_FEE {
            // Burns below the fee go to the fee wallet in full.
            return match payments.as_slice() {
                [only] if only.destination == fee_wallet && only.amount == event.amount => Ok(()),
                _ => Err(AgentError::invalid(
                    "a withdraw below the fee must pay the fee wallet only",
                )),
            };
        }

        if payments.len() != 2 {
            return Err(AgentError::invalid(
                "a withdraw tx needs to contain 2 payment operations",
            ));
        }
        let mut fee_paid = false;
        let mut receiver_paid = false;
        for payment in &payments {
            if payment.destination == fee_wallet && !fee_paid {
                if payment.amount != WITHDRAW_FEE {
                    return Err(AgentError::invalid("the withdraw fee is incorrect"));
                }
                fee_paid = true;
            } else if payment.destination == event.memo && !receiver_paid {
                if payment.amount != event.amount - WITHDRAW_FEE {
                    return Err(AgentError::invalid("amount is not correct"));
                }
                receiver_paid = true;
            } else {
                return Err(AgentError::invalid(format!(
                    "destination is not correct, got {}, need {}",
                    payment.destination, event.memo
                )));
            }
        }
        if !fee_paid {
            return Err(AgentError::invalid("no withdraw fee payment"));
        }
        Ok(())
    }

    /// Checks a proposed refund against the deposit it returns.
    pub async fn validate_refund(&self, encoded: &str, deposit_tx_hash: &str) -> AgentResult<()> {
        let envelope = decode_envelope(encoded)?;
        self.require_vault_source(&envelope_source(&envelope)?)?;

        let expected = MemoKey::from_hex(deposit_tx_hash)
            .map_err(|_| AgentError::invalid("refunded deposit hash is not a transaction hash"))?;
        match envelope_memo(&envelope)? {
            EnvelopeMemo::Return(key) if key == expected => {}
            _ => {
                return Err(AgentError::invalid(
                    "the transaction memo and the refunded deposit do not match",
                ))
            }
        }
        if self.wallet.memory().memo_key_seen(&expected).await? {
            return Err(AgentError::AlreadySettled(
                "the deposit was already refunded".to_string(),
            ));
        }

        let payments = self.tft_payments(&envelope_payments(&envelope)?)?;
        if payments.len() > 2 {
            return Err(AgentError::invalid("the refund transaction has too many operations"));
        }
        let fee_wallet = self.wallet.fee_wallet();
        let mut penalty = None;
        let mut refund = None;
        for payment in &payments {
            if payment.destination == fee_wallet {
                if penalty.replace(payment.amount).is_some() {
                    return Err(AgentError::invalid("multiple payments to the fee wallet"));
                }
                if payment.amount != WITHDRAW_FEE {
                    return Err(AgentError::invalid("invalid fee payment"));
                }
            } else if refund.replace(payment).is_some() {
                return Err(AgentError::invalid("the refund pays more than one account"));
            }
        }
        let Some(refund) = refund else {
            return Err(AgentError::invalid("the refund pays nobody"));
        };

        let key_hex = expected.to_hex();
        let (deposited, sender) = self.wallet.get_deposit_amount_and_sender(&key_hex).await?;
        if refund.destination != sender {
            return Err(AgentError::invalid(format!(
                "destination is not correct, got {}, original account debited is {sender}",
                refund.destination
            )));
        }
        if refund.amount.checked_add(WITHDRAW_FEE) != Some(deposited) {
            return Err(AgentError::invalid(
                "the refunded amount does not match the deposit",
            ));
        }
        Ok(())
    }

    /// Checks a proposed deposit fee collection.
    pub async fn validate_fee_transfer(&self, encoded: &str) -> AgentResult<()> {
        let envelope = decode_envelope(encoded)?;
        self.require_vault_source(&envelope_source(&envelope)?)?;

        let payments = self.tft_payments(&envelope_payments(&envelope)?)?;
        let [payment] = payments.as_slice() else {
            return Err(AgentError::invalid(
                "the transaction should have exactly 1 operation",
            ));
        };
        if payment.destination != self.wallet.fee_wallet() {
            return Err(AgentError::invalid(format!(
                "destination is not correct, got {}, need fee wallet {}",
                payment.destination,
                self.wallet.fee_wallet()
            )));
        }
        if payment.amount != self.deposit_fee {
            return Err(AgentError::invalid(format!(
                "amount is not correct, received {}, need {}",
                payment.amount, self.deposit_fee
            )));
        }

        let EnvelopeMemo::Hash(key) = envelope_memo(&envelope)? else {
            return Err(AgentError::invalid("a fee transfer needs a hash memo"));
        };
        if self.wallet.memory().memo_key_seen(&key).await? {
            return Err(AgentError::AlreadySettled(
                "transaction already exists".to_string(),
            ));
        }

        let (deposited, _sender) = self
            .wallet
            .get_deposit_amount_and_sender(&key.to_hex())
            .await?;
        if deposited <= self.deposit_fee {
            return Err(AgentError::invalid(
                "the amount of the deposit is smaller than the deposit fee",
            ));
        }
        Ok(())
    }

    fn require_vault_source(&self, source: &str) -> AgentResult<()> {
        if source != self.wallet.vault_address() {
            return Err(AgentError::invalid("transaction source is not the vault"));
        }
        Ok(())
    }

    /// Rejects payments of anything but TFT.
    fn tft_payments(&self, payments: &[Payment]) -> AgentResult<Vec<Payment>> {
        let tft = self.wallet.tft_asset();
        if payments.iter().any(|p| p.asset != tft) {
            return Err(AgentError::invalid("transaction pays an asset other than TFT"));
        }
        Ok(payments.to_vec())
    }
}

#[async_trait]
impl SignerService for Follower {
    async fn sign(&self, request: SigningRequest) -> Result<SignerResponse, RpcError> {
        let kind = request.label();
        self.handle(request).await.map_err(|e| {
            match &e {
                AgentError::InvalidRequest(_) | AgentError::AlreadySettled(_) => {
                    warn!(kind, %e, "refusing signing request");
                }
                _ => error!(kind, %e, "could not validate signing request"),
            }
            RpcError::from(e)
        })
    }

    async fn destination_id(&self) -> Result<DestinationIdResponse, RpcError> {
        Ok(DestinationIdResponse {
            destination_chain_address: self.chain.own_address(),
        })
    }
}
