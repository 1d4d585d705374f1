//! The vault wallet.
//!
//! Builds payouts, refunds and fee transfers out of the shared multisig vault, gathers cosigner
//! signatures for them and submits them to Horizon. Every vault transaction carries a hash or
//! return memo, and nothing is submitted when a vault transaction with the same memo key already
//! exists, which is what keeps settlements from being paid twice.

use std::{collections::HashSet, fmt, sync::Arc};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use stellar_xdr::curr::TransactionEnvelope;
use tft_bridge_primitives::{
    amount::decimal_to_stroops,
    constants::{TFT_ASSET_CODE, TX_TIMEOUT_SECS, WITHDRAW_FEE},
    errors::{ErrorKind, RpcError},
    memo::{MemoKey, ShortId},
    network::StellarNetwork,
    types::{Deposit, DepositMemo, SignResponse, SigningRequest},
};
use tracing::{debug, info, warn};

use crate::{
    errors::{StellarError, StellarResult},
    horizon::{Horizon, RecordMemo, TransactionRecord},
    keys::{decode_address, is_valid_address, verify_signature, VaultKeypair},
    memory::{StoredTx, TxMemory},
    xdr::{
        add_signature, build_payment_transaction, decode_envelope, encode_envelope,
        envelope_memo, envelope_payments, sign_envelope, transaction_hash, EnvelopeMemo, Payment,
    },
};

/// Effect type of the debited side of a payment.
const ACCOUNT_DEBITED: &str = "account_debited";

/// Effect type of the credited side of a payment.
const ACCOUNT_CREDITED: &str = "account_credited";

/// Signer type of plain ed25519 account signers.
const ED25519_SIGNER: &str = "ed25519_public_key";

/// Decides whether the response of a cosigner (given by its address) carries a valid signature.
pub type SignatureCheck<'a> = dyn Fn(&str, &SignResponse) -> bool + Send + Sync + 'a;

/// Gathers cosigner signatures over a vault transaction.
#[async_trait]
pub trait SignatureCollector: Send + Sync + fmt::Debug {
    /// Sends `request` to `cosigners` and returns the responses gathered before the signing
    /// deadline.
    ///
    /// Only responses passing `check` count towards the request's required signatures.
    async fn collect(
        &self,
        request: SigningRequest,
        cosigners: &[String],
        check: &SignatureCheck<'_>,
    ) -> Result<Vec<SignResponse>, RpcError>;
}

/// Why a vault transaction is being settled, which determines what cosigners check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementKind {
    /// Payout of a destination-chain burn.
    Withdraw {
        /// Destination-chain account that burned the tokens.
        expected_receiver: String,
        /// Block from which the burn can be found.
        block_start: u64,
    },

    /// Refund of a deposit.
    Refund {
        /// Hex hash of the refunded deposit.
        deposit_tx_hash: String,
    },

    /// Deposit fee collection.
    FeeTransfer,
}

impl SettlementKind {
    fn signing_request(&self, encoded: String, required_signatures: usize) -> SigningRequest {
        match self {
            SettlementKind::Withdraw {
                expected_receiver,
                block_start,
            } => SigningRequest::Withdraw {
                encoded_stellar_tx: encoded,
                required_signatures,
                expected_receiver: expected_receiver.clone(),
                expected_block_start: *block_start,
            },
            SettlementKind::Refund { deposit_tx_hash } => SigningRequest::Refund {
                encoded_stellar_tx: encoded,
                required_signatures,
                original_deposit_tx_hash_hex: deposit_tx_hash.clone(),
            },
            SettlementKind::FeeTransfer => SigningRequest::FeeTransfer {
                encoded_stellar_tx: encoded,
                required_signatures,
            },
        }
    }
}

/// The result of a settlement attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The transaction was applied.
    Submitted {
        /// Hash of the applied transaction.
        hash: String,
    },

    /// A vault transaction with the same memo key already exists.
    AlreadySettled,

    /// The recipient has no account or no TFT trustline.
    Unreachable,

    /// Nothing to submit, e.g. a refund of dust or an undecodable recipient.
    Skipped,
}

impl SubmitOutcome {
    /// Whether a new transaction was applied.
    pub const fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted { .. })
    }
}

/// Wallet over the shared vault account.
#[derive(Debug, Clone)]
pub struct VaultWallet {
    horizon: Arc<dyn Horizon>,
    memory: Arc<TxMemory>,
    keypair: VaultKeypair,
    network: StellarNetwork,
    vault_address: String,
    fee_wallet: String,
    collector: Option<Arc<dyn SignatureCollector>>,
}

impl VaultWallet {
    /// Creates a wallet over `vault_address` that signs with `keypair`.
    ///
    /// A wallet without a [`SignatureCollector`] can only inspect and cosign transactions.
    pub fn new(
        horizon: Arc<dyn Horizon>,
        memory: Arc<TxMemory>,
        keypair: VaultKeypair,
        vault_address: impl Into<String>,
        fee_wallet: impl Into<String>,
    ) -> Self {
        let network = memory.network();
        Self {
            horizon,
            memory,
            keypair,
            network,
            vault_address: vault_address.into(),
            fee_wallet: fee_wallet.into(),
            collector: None,
        }
    }

    /// Attaches the cosigner signature collector used for submissions.
    pub fn with_collector(mut self, collector: Arc<dyn SignatureCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// The vault address.
    pub fn vault_address(&self) -> &str {
        &self.vault_address
    }

    /// The fee wallet address.
    pub fn fee_wallet(&self) -> &str {
        &self.fee_wallet
    }

    /// The Stellar address of this node's key.
    pub fn address(&self) -> &str {
        self.keypair.address()
    }

    /// The Stellar network of the vault.
    pub const fn network(&self) -> StellarNetwork {
        self.network
    }

    /// The transaction memory of the vault.
    pub fn memory(&self) -> &Arc<TxMemory> {
        &self.memory
    }

    /// Renders the TFT asset of the vault's network.
    pub fn tft_asset(&self) -> String {
        crate::xdr::tft_asset_name(self.network)
    }

    /// Number of cosigner signatures a payment needs besides this node's own.
    pub async fn required_signatures(&self) -> StellarResult<usize> {
        let account = self.horizon.account(&self.vault_address).await?;
        Ok(usize::from(account.thresholds.med_threshold.saturating_sub(1)))
    }

    /// Stellar addresses of the vault signers other than this node.
    pub async fn cosigners(&self) -> StellarResult<Vec<String>> {
        let account = self.horizon.account(&self.vault_address).await?;
        Ok(account
            .signers
            .into_iter()
            .filter(|s| s.weight > 0 && s.kind == ED25519_SIGNER && s.key != self.address())
            .map(|s| s.key)
            .collect())
    }

    /// Builds an unsigned vault transaction with the next sequence number.
    pub async fn build(
        &self,
        memo: EnvelopeMemo,
        payments: &[Payment],
    ) -> StellarResult<TransactionEnvelope> {
        let account = self.horizon.account(&self.vault_address).await?;
        let sequence: i64 = account.sequence.parse().map_err(|_| {
            StellarError::Malformed(format!("invalid sequence number {}", account.sequence))
        })?;
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();

        build_payment_transaction(
            &self.vault_address,
            sequence + 1,
            &memo,
            payments,
            now + TX_TIMEOUT_SECS,
        )
    }

    /// Pays out a burn of `amount` stroops to `receiver`, keeping [`WITHDRAW_FEE`] for the fee
    /// wallet.
    pub async fn payout(
        &self,
        receiver: &str,
        amount: u64,
        short_id: ShortId,
        expected_receiver: &str,
        block_start: u64,
    ) -> StellarResult<SubmitOutcome> {
        if !is_valid_address(receiver) {
            warn!(%receiver, %short_id, "payout receiver is not a stellar address, skipping");
            return Ok(SubmitOutcome::Skipped);
        }
        if amount <= WITHDRAW_FEE {
            return Err(StellarError::InvalidRequest(format!(
                "payout of {amount} does not exceed the withdraw fee"
            )));
        }

        let payments = self.split_fee(receiver, amount);
        let envelope = self.build(EnvelopeMemo::Hash(short_id), &payments).await?;
        let kind = SettlementKind::Withdraw {
            expected_receiver: expected_receiver.to_string(),
            block_start,
        };
        self.submit(envelope, kind).await
    }

    /// Refunds `deposit` to its sender minus [`WITHDRAW_FEE`]. Dust deposits are kept.
    pub async fn refund(&self, deposit: &Deposit) -> StellarResult<SubmitOutcome> {
        if deposit.amount <= WITHDRAW_FEE {
            info!(tx_hash = %deposit.tx_hash, amount = deposit.amount, "deposit is dust, not refunding");
            return Ok(SubmitOutcome::Skipped);
        }
        if !is_valid_address(&deposit.sender) {
            warn!(tx_hash = %deposit.tx_hash, sender = %deposit.sender, "refund sender is not a stellar address, skipping");
            return Ok(SubmitOutcome::Skipped);
        }

        let memo_key = MemoKey::from_hex(&deposit.tx_hash)?;
        let payments = self.split_fee(&deposit.sender, deposit.amount);
        let envelope = self.build(EnvelopeMemo::Return(memo_key), &payments).await?;
        let kind = SettlementKind::Refund {
            deposit_tx_hash: deposit.tx_hash.clone(),
        };
        self.submit(envelope, kind).await
    }

    /// Sends `amount` stroops to the fee wallet with a hash memo of `memo_key`.
    pub async fn transfer_fee(
        &self,
        amount: u64,
        memo_key: MemoKey,
        kind: SettlementKind,
    ) -> StellarResult<SubmitOutcome> {
        if amount == 0 {
            return Ok(SubmitOutcome::Skipped);
        }
        let payments = [Payment::tft(self.network, &self.fee_wallet, amount)];
        let envelope = self.build(EnvelopeMemo::Hash(memo_key), &payments).await?;
        self.submit(envelope, kind).await
    }

    fn split_fee(&self, receiver: &str, amount: u64) -> Vec<Payment> {
        let mut payments = vec![Payment::tft(
            self.network,
            receiver,
            amount.saturating_sub(WITHDRAW_FEE),
        )];
        if !self.fee_wallet.is_empty() {
            payments.push(Payment::tft(self.network, &self.fee_wallet, WITHDRAW_FEE));
        }
        payments
    }

    /// Collects cosigner signatures for `envelope`, signs it and submits it.
    ///
    /// Returns [`SubmitOutcome::AlreadySettled`] without contacting anyone if a vault transaction
    /// with the envelope's memo key exists.
    pub async fn submit(
        &self,
        mut envelope: TransactionEnvelope,
        kind: SettlementKind,
    ) -> StellarResult<SubmitOutcome> {
        let memo = envelope_memo(&envelope)?;
        if let Some(key) = memo.memo_key() {
            if self.memory.memo_key_seen(&key).await? {
                info!(memo_key = %key, "vault already settled this memo, not submitting");
                return Ok(SubmitOutcome::AlreadySettled);
            }
        }

        let required = self.required_signatures().await?;
        let hash = transaction_hash(&envelope, self.network)?;
        let hash_hex = hex::encode(hash);

        if required > 0 {
            let collector = self.collector.as_ref().ok_or_else(|| {
                StellarError::InvalidRequest("wallet cannot collect signatures".to_string())
            })?;
            let cosigners = self.cosigners().await?;
            let request = kind.signing_request(encode_envelope(&envelope)?, required);

            debug!(tx_hash = %hash_hex, kind = request.label(), required, "requesting signatures");
            let check = |peer: &str, response: &SignResponse| {
                response.signer_address == peer
                    && checked_signature(response, &cosigners, &hash).is_some()
            };
            let responses = collector.collect(request, &cosigners, &check).await?;
            let signatures = valid_signatures(&responses, &cosigners, &hash, required);
            if signatures.len() < required {
                return Err(StellarError::ThresholdNotMet {
                    got: signatures.len(),
                    required,
                });
            }
            for (public_key, signature) in &signatures {
                add_signature(&mut envelope, public_key, signature)?;
            }
        }

        let own = sign_envelope(&envelope, &self.keypair, self.network)?;
        add_signature(&mut envelope, &self.keypair.public_key(), &own)?;

        let operations = envelope_payments(&envelope)?;
        match self
            .horizon
            .submit_transaction(&encode_envelope(&envelope)?)
            .await
        {
            Ok(response) => {
                info!(tx_hash = %response.hash, memo = ?memo, "submitted vault transaction");
                self.memory.store(StoredTx {
                    hash: response.hash.clone(),
                    source_account: self.vault_address.clone(),
                    memo: record_memo(&memo),
                    paging_token: response.paging_token.unwrap_or_default(),
                    successful: true,
                    operations,
                });
                Ok(SubmitOutcome::Submitted {
                    hash: response.hash,
                })
            }
            Err(e) if e.is_unreachable_recipient() => {
                warn!(tx_hash = %hash_hex, %e, "recipient cannot receive TFT, dropping settlement");
                Ok(SubmitOutcome::Unreachable)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Signs an encoded vault transaction on behalf of a leader.
    pub fn cosign(&self, encoded: &str) -> StellarResult<SignResponse> {
        let envelope = decode_envelope(encoded)?;
        let signature = sign_envelope(&envelope, &self.keypair, self.network)?;
        Ok(SignResponse {
            signer_address: self.address().to_string(),
            base64_signature: STANDARD.encode(signature),
        })
    }

    /// Sums the TFT credited to the vault by `tx_hash` and returns it with the debited account.
    pub async fn get_deposit_amount_and_sender(&self, tx_hash: &str) -> StellarResult<(u64, String)> {
        let effects = self.horizon.transaction_effects(tx_hash).await?;
        let issuer = self.network.tft_issuer();

        let mut amount = 0u64;
        let mut sender = String::new();
        for effect in effects {
            let is_tft = effect.asset_code.as_deref() == Some(TFT_ASSET_CODE)
                && effect.asset_issuer.as_deref() == Some(issuer);
            if !is_tft {
                continue;
            }
            match effect.kind.as_str() {
                ACCOUNT_DEBITED => sender = effect.account,
                ACCOUNT_CREDITED if effect.account == self.vault_address => {
                    let credited = decimal_to_stroops(effect.amount.as_deref().unwrap_or_default())?;
                    amount = amount.checked_add(credited).ok_or_else(|| {
                        StellarError::Malformed(format!("credited amount overflows in {tx_hash}"))
                    })?;
                }
                _ => {}
            }
        }
        Ok((amount, sender))
    }

    /// Interprets a vault transaction as a deposit.
    pub async fn deposit(&self, record: &TransactionRecord) -> StellarResult<Deposit> {
        let (amount, sender) = self.get_deposit_amount_and_sender(&record.hash).await?;
        let memo = match record.typed_memo() {
            RecordMemo::Text(text) => Some(DepositMemo::Text(text)),
            RecordMemo::Hash(key) => Some(DepositMemo::Hash(key)),
            _ => None,
        };
        Ok(Deposit {
            tx_hash: record.hash.clone(),
            sender,
            amount,
            memo,
        })
    }
}

/// Checks cosigner responses against `hash` and keeps up to `required` distinct valid ones.
fn valid_signatures(
    responses: &[SignResponse],
    cosigners: &[String],
    hash: &[u8; 32],
    required: usize,
) -> Vec<([u8; 32], [u8; 64])> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(required);
    for response in responses {
        if valid.len() == required {
            break;
        }
        if !seen.insert(response.signer_address.as_str()) {
            warn!(signer = %response.signer_address, "ignoring duplicate signature");
            continue;
        }
        if let Some(signature) = checked_signature(response, cosigners, hash) {
            valid.push(signature);
        }
    }
    valid
}

/// Returns the public key and signature of `response` if it is a cosigner's valid signature
/// over `hash`.
fn checked_signature(
    response: &SignResponse,
    cosigners: &[String],
    hash: &[u8; 32],
) -> Option<([u8; 32], [u8; 64])> {
    let signer = &response.signer_address;
    if !cosigners.contains(signer) {
        warn!(%signer, "ignoring signature from unexpected signer");
        return None;
    }
    let Some(signature) = STANDARD
        .decode(&response.base64_signature)
        .ok()
        .and_then(|bytes| <[u8; 64]>::try_from(bytes).ok())
    else {
        warn!(%signer, "ignoring undecodable signature");
        return None;
    };
    if !verify_signature(signer, hash, &signature) {
        warn!(%signer, "ignoring invalid signature");
        return None;
    }
    let public_key = decode_address(signer).ok()?;
    Some((public_key, signature))
}

fn record_memo(memo: &EnvelopeMemo) -> RecordMemo {
    match memo {
        EnvelopeMemo::None => RecordMemo::None,
        EnvelopeMemo::Text(text) => RecordMemo::Text(text.clone()),
        EnvelopeMemo::Id(id) => RecordMemo::Id(id.to_string()),
        EnvelopeMemo::Hash(key) => RecordMemo::Hash(*key),
        EnvelopeMemo::Return(key) => RecordMemo::Return(*key),
    }
}

impl From<StellarError> for RpcError {
    fn from(err: StellarError) -> Self {
        match err.kind() {
            ErrorKind::InvalidRequest | ErrorKind::NotFound | ErrorKind::AlreadySettled => {
                RpcError::new(err.kind(), err.to_string())
            }
            _ => RpcError::new(ErrorKind::Transient, "signer failed to process the request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tft_bridge_primitives::constants::STROOPS_PER_TFT;

    use super::*;
    use crate::test_utils::{MockHorizon, StaticCollector};

    const NETWORK: StellarNetwork = StellarNetwork::Testnet;

    struct Fixture {
        horizon: Arc<MockHorizon>,
        wallet: VaultWallet,
        fee_wallet: VaultKeypair,
        cosigners: Vec<VaultKeypair>,
    }

    fn fixture(reachable: usize) -> Fixture {
        let vault = VaultKeypair::from_secret_bytes([1; 32]);
        let cosigners: Vec<_> = (2..5u8).map(|i| VaultKeypair::from_secret_bytes([i; 32])).collect();
        let fee_wallet = VaultKeypair::from_secret_bytes([9; 32]);

        let horizon = Arc::new(MockHorizon::new(NETWORK));
        let mut signers = vec![(vault.address().to_string(), 1)];
        signers.extend(cosigners.iter().map(|k| (k.address().to_string(), 1)));
        horizon.set_account(vault.address(), 100, 3, signers);

        let memory = Arc::new(TxMemory::new(horizon.clone(), vault.address(), NETWORK));
        let collector = StaticCollector::new(NETWORK, cosigners[..reachable].to_vec());
        let wallet = VaultWallet::new(
            horizon.clone(),
            memory,
            vault.clone(),
            vault.address(),
            fee_wallet.address(),
        )
        .with_collector(Arc::new(collector));

        Fixture {
            horizon,
            wallet,
            fee_wallet,
            cosigners,
        }
    }

    #[tokio::test]
    async fn account_introspection() {
        let f = fixture(3);
        assert_eq!(f.wallet.required_signatures().await.unwrap(), 2);
        let cosigners = f.wallet.cosigners().await.unwrap();
        assert_eq!(cosigners.len(), 3);
        assert!(!cosigners.contains(&f.wallet.address().to_string()));
    }

    #[tokio::test]
    async fn payout_splits_fee_and_is_not_repeated() {
        let f = fixture(3);
        let receiver = VaultKeypair::from_secret_bytes([7; 32]);
        let short_id = ShortId::new([5; 32]);

        let outcome = f
            .wallet
            .payout(receiver.address(), 10 * STROOPS_PER_TFT, short_id, "0xab", 1000)
            .await
            .unwrap();
        assert!(outcome.is_submitted());

        let submitted = f.horizon.submitted();
        assert_eq!(submitted.len(), 1);
        let payments = envelope_payments(&submitted[0]).unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].destination, receiver.address());
        assert_eq!(payments[0].amount, 9 * STROOPS_PER_TFT);
        assert_eq!(payments[1].destination, f.fee_wallet.address());
        assert_eq!(payments[1].amount, WITHDRAW_FEE);
        assert_eq!(envelope_memo(&submitted[0]).unwrap(), EnvelopeMemo::Hash(short_id));
        // own signature plus two cosigners
        assert_eq!(crate::xdr::signature_count(&submitted[0]), 3);

        let again = f
            .wallet
            .payout(receiver.address(), 10 * STROOPS_PER_TFT, short_id, "0xab", 1000)
            .await
            .unwrap();
        assert_eq!(again, SubmitOutcome::AlreadySettled);
        assert_eq!(f.horizon.submitted().len(), 1);
    }

    #[tokio::test]
    async fn threshold_shortfall_is_an_error() {
        let f = fixture(1);
        let receiver = VaultKeypair::from_secret_bytes([7; 32]);
        let err = f
            .wallet
            .payout(receiver.address(), 10 * STROOPS_PER_TFT, ShortId::new([5; 32]), "0xab", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StellarError::ThresholdNotMet { got: 1, required: 2 }));
        assert_eq!(err.kind(), ErrorKind::ThresholdNotMet);
        assert!(f.horizon.submitted().is_empty());
    }

    #[tokio::test]
    async fn unreachable_recipient_is_not_an_error() {
        let f = fixture(3);
        f.horizon.fail_next_submit(vec!["op_no_trust"]);
        let receiver = VaultKeypair::from_secret_bytes([7; 32]);
        let outcome = f
            .wallet
            .payout(receiver.address(), 10 * STROOPS_PER_TFT, ShortId::new([6; 32]), "0xab", 1)
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Unreachable);
    }

    #[tokio::test]
    async fn invalid_receiver_is_skipped() {
        let f = fixture(3);
        let outcome = f
            .wallet
            .payout("not-an-address", 10 * STROOPS_PER_TFT, ShortId::new([6; 32]), "0xab", 1)
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Skipped);
        assert!(f.horizon.submitted().is_empty());
    }

    #[tokio::test]
    async fn deposit_amount_and_refund() {
        let f = fixture(3);
        let user = VaultKeypair::from_secret_bytes([8; 32]);
        let hash = f
            .horizon
            .add_deposit(user.address(), f.wallet.vault_address(), 40 * STROOPS_PER_TFT, None);

        let (amount, sender) = f.wallet.get_deposit_amount_and_sender(&hash).await.unwrap();
        assert_eq!(amount, 40 * STROOPS_PER_TFT);
        assert_eq!(sender, user.address());

        let deposit = Deposit {
            tx_hash: hash.clone(),
            sender,
            amount,
            memo: None,
        };
        assert!(f.wallet.refund(&deposit).await.unwrap().is_submitted());

        let submitted = f.horizon.submitted();
        let payments = envelope_payments(&submitted[0]).unwrap();
        assert_eq!(payments[0].amount, 39 * STROOPS_PER_TFT);
        assert_eq!(payments[0].destination, user.address());
        assert_eq!(
            envelope_memo(&submitted[0]).unwrap(),
            EnvelopeMemo::Return(MemoKey::from_hex(&hash).unwrap())
        );

        assert_eq!(f.wallet.refund(&deposit).await.unwrap(), SubmitOutcome::AlreadySettled);
    }

    #[tokio::test]
    async fn dust_is_not_refunded() {
        let f = fixture(3);
        let deposit = Deposit {
            tx_hash: hex::encode([1u8; 32]),
            sender: f.cosigners[0].address().to_string(),
            amount: WITHDRAW_FEE,
            memo: None,
        };
        assert_eq!(f.wallet.refund(&deposit).await.unwrap(), SubmitOutcome::Skipped);
    }

    #[tokio::test]
    async fn fee_transfer_uses_hash_memo() {
        let f = fixture(3);
        let key = MemoKey::new([4; 32]);
        let outcome = f
            .wallet
            .transfer_fee(50 * STROOPS_PER_TFT, key, SettlementKind::FeeTransfer)
            .await
            .unwrap();
        assert!(outcome.is_submitted());

        let submitted = f.horizon.submitted();
        let payments = envelope_payments(&submitted[0]).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].destination, f.fee_wallet.address());
        assert_eq!(envelope_memo(&submitted[0]).unwrap(), EnvelopeMemo::Hash(key));
    }

    #[test]
    fn forged_signatures_are_dropped() {
        let signer = VaultKeypair::from_secret_bytes([2; 32]);
        let other = VaultKeypair::from_secret_bytes([3; 32]);
        let hash = [0x11; 32];
        let cosigners = vec![signer.address().to_string(), other.address().to_string()];

        let responses = vec![
            SignResponse {
                signer_address: other.address().to_string(),
                base64_signature: STANDARD.encode(signer.sign(&hash)),
            },
            SignResponse {
                signer_address: signer.address().to_string(),
                base64_signature: STANDARD.encode(signer.sign(&hash)),
            },
            SignResponse {
                signer_address: signer.address().to_string(),
                base64_signature: STANDARD.encode(signer.sign(&hash)),
            },
        ];
        let valid = valid_signatures(&responses, &cosigners, &hash, 2);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].0, signer.public_key());
    }

    #[test]
    fn internal_errors_are_hidden_on_the_wire() {
        let rpc: RpcError = StellarError::ThresholdNotMet { got: 0, required: 1 }.into();
        assert_eq!(rpc.kind, ErrorKind::Transient);
        assert!(!rpc.message.contains("required"));

        let rpc: RpcError = StellarError::InvalidRequest("amounts do not match".to_string()).into();
        assert_eq!(rpc.kind, ErrorKind::InvalidRequest);
        assert!(rpc.message.contains("amounts do not match"));
    }
}
