//! In-memory fakes of the Horizon seam and of a cosigner set.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use stellar_xdr::curr::TransactionEnvelope;
use tft_bridge_primitives::{
    amount::stroops_to_decimal,
    constants::TFT_ASSET_CODE,
    errors::RpcError,
    network::StellarNetwork,
    types::{DepositMemo, SignResponse, SigningRequest},
};

use crate::{
    errors::{HorizonError, HorizonResult},
    horizon::{
        AccountRecord, AccountSigner, EffectRecord, Horizon, RecordMemo, SubmitResponse,
        Thresholds, TransactionRecord,
    },
    keys::VaultKeypair,
    wallet::{SignatureCheck, SignatureCollector},
    xdr::{
        decode_envelope, envelope_memo, envelope_payments, envelope_source, sign_envelope,
        signature_count, transaction_hash_hex, EnvelopeMemo,
    },
};

#[derive(Debug, Default)]
struct MockState {
    next_token: u64,
    transactions: HashMap<String, Vec<TransactionRecord>>,
    effects: HashMap<String, Vec<EffectRecord>>,
    accounts: HashMap<String, AccountRecord>,
    submitted: Vec<TransactionEnvelope>,
    overloaded_pages: usize,
    requested_limits: Vec<u32>,
    submit_failures: VecDeque<Vec<String>>,
}

impl MockState {
    fn next_token(&mut self) -> String {
        self.next_token += 1;
        self.next_token.to_string()
    }

    fn append(&mut self, account: &str, record: TransactionRecord) {
        self.transactions
            .entry(account.to_string())
            .or_default()
            .push(record);
    }
}

/// A Horizon that keeps accounts, transactions and effects in memory.
///
/// Submitted envelopes are applied: they show up in the transaction streams of their source and
/// destination accounts and bump the source account's sequence number.
#[derive(Debug)]
pub struct MockHorizon {
    network: StellarNetwork,
    state: Mutex<MockState>,
}

impl MockHorizon {
    /// Creates an empty Horizon for `network`.
    pub fn new(network: StellarNetwork) -> Self {
        Self {
            network,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Creates or replaces an account with equally weighted signers.
    pub fn set_account(
        &self,
        account: &str,
        sequence: i64,
        med_threshold: u8,
        signers: Vec<(String, u32)>,
    ) {
        let record = AccountRecord {
            account_id: account.to_string(),
            sequence: sequence.to_string(),
            thresholds: Thresholds {
                low_threshold: 0,
                med_threshold,
                high_threshold: med_threshold,
            },
            signers: signers
                .into_iter()
                .map(|(key, weight)| AccountSigner {
                    key,
                    weight,
                    kind: "ed25519_public_key".to_string(),
                })
                .collect(),
        };
        self.state
            .lock()
            .accounts
            .insert(account.to_string(), record);
    }

    /// Records a TFT payment of `amount` stroops from `sender` to `vault` and returns its hash.
    pub fn add_deposit(
        &self,
        sender: &str,
        vault: &str,
        amount: u64,
        memo: Option<DepositMemo>,
    ) -> String {
        let memo = match memo {
            Some(DepositMemo::Text(text)) => RecordMemo::Text(text),
            Some(DepositMemo::Hash(key)) => RecordMemo::Hash(key),
            None => RecordMemo::None,
        };
        let hash = self.add_transaction_for(vault, sender, memo);

        let mut state = self.state.lock();
        let issuer = self.network.tft_issuer();
        state.effects.insert(
            hash.clone(),
            vec![
                tft_effect("account_debited", sender, amount, issuer),
                tft_effect("account_credited", vault, amount, issuer),
            ],
        );
        let record = state
            .transactions
            .get(vault)
            .and_then(|txs| txs.last())
            .cloned();
        if let Some(record) = record {
            state.append(sender, record);
        }
        hash
    }

    /// Records a transaction sent by `source` and returns its hash.
    pub fn add_transaction(&self, source: &str, memo: RecordMemo) -> String {
        self.add_transaction_for(source, source, memo)
    }

    /// Records a transaction from `source` in the stream of `account` and returns its hash.
    pub fn add_transaction_for(&self, account: &str, source: &str, memo: RecordMemo) -> String {
        let mut state = self.state.lock();
        let token = state.next_token();
        let hash = hex::encode(Sha256::digest(format!("mock-tx-{token}").as_bytes()));
        let record = record(&hash, source, &memo, token, None);
        state.append(account, record);
        hash
    }

    /// Marks a recorded transaction as failed.
    pub fn mark_unsuccessful(&self, hash: &str) {
        let mut state = self.state.lock();
        for record in state.transactions.values_mut().flatten() {
            if record.hash == hash {
                record.successful = false;
            }
        }
    }

    /// Makes the next `pages` transaction page requests fail with a 503.
    pub fn fail_next_pages(&self, pages: usize) {
        self.state.lock().overloaded_pages = pages;
    }

    /// Makes the next submission fail with the given operation result codes.
    pub fn fail_next_submit(&self, operations: Vec<&str>) {
        self.state
            .lock()
            .submit_failures
            .push_back(operations.into_iter().map(str::to_string).collect());
    }

    /// Page sizes requested so far.
    pub fn requested_limits(&self) -> Vec<u32> {
        self.state.lock().requested_limits.clone()
    }

    /// Envelopes applied so far.
    pub fn submitted(&self) -> Vec<TransactionEnvelope> {
        self.state.lock().submitted.clone()
    }

    /// Envelopes applied so far whose memo carries `memo`.
    pub fn submitted_with_memo(&self, memo: &EnvelopeMemo) -> Vec<TransactionEnvelope> {
        self.submitted()
            .into_iter()
            .filter(|env| envelope_memo(env).ok().as_ref() == Some(memo))
            .collect()
    }
}

fn tft_effect(kind: &str, account: &str, amount: u64, issuer: &str) -> EffectRecord {
    EffectRecord {
        kind: kind.to_string(),
        account: account.to_string(),
        amount: Some(stroops_to_decimal(amount)),
        asset_type: Some("credit_alphanum4".to_string()),
        asset_code: Some(TFT_ASSET_CODE.to_string()),
        asset_issuer: Some(issuer.to_string()),
    }
}

fn record(
    hash: &str,
    source: &str,
    memo: &RecordMemo,
    paging_token: String,
    envelope_xdr: Option<String>,
) -> TransactionRecord {
    let (memo_type, memo) = match memo {
        RecordMemo::None => ("none", None),
        RecordMemo::Text(text) => ("text", Some(text.clone())),
        RecordMemo::Id(id) => ("id", Some(id.clone())),
        RecordMemo::Hash(key) => ("hash", Some(STANDARD.encode(key.as_bytes()))),
        RecordMemo::Return(key) => ("return", Some(STANDARD.encode(key.as_bytes()))),
        RecordMemo::Undecodable(raw) => ("hash", Some(raw.clone())),
    };
    TransactionRecord {
        hash: hash.to_string(),
        successful: true,
        source_account: source.to_string(),
        memo_type: memo_type.to_string(),
        memo,
        paging_token,
        envelope_xdr,
    }
}

#[async_trait]
impl Horizon for MockHorizon {
    async fn account_transactions(
        &self,
        account: &str,
        cursor: &str,
        limit: u32,
    ) -> HorizonResult<Vec<TransactionRecord>> {
        let mut state = self.state.lock();
        state.requested_limits.push(limit);
        if state.overloaded_pages > 0 {
            state.overloaded_pages -= 1;
            return Err(HorizonError::Overloaded(503));
        }

        let after: u64 = cursor.parse().unwrap_or_default();
        Ok(state
            .transactions
            .get(account)
            .map(|txs| {
                txs.iter()
                    .filter(|tx| tx.paging_token.parse::<u64>().unwrap_or_default() > after)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn transaction_effects(&self, hash: &str) -> HorizonResult<Vec<EffectRecord>> {
        self.state
            .lock()
            .effects
            .get(hash)
            .cloned()
            .ok_or_else(|| HorizonError::NotFound(format!("effects of {hash}")))
    }

    async fn account(&self, account: &str) -> HorizonResult<AccountRecord> {
        self.state
            .lock()
            .accounts
            .get(account)
            .cloned()
            .ok_or_else(|| HorizonError::NotFound(format!("account {account}")))
    }

    async fn submit_transaction(&self, envelope_xdr: &str) -> HorizonResult<SubmitResponse> {
        let decode = |e: crate::errors::StellarError| HorizonError::Decode(e.to_string());
        let envelope = decode_envelope(envelope_xdr).map_err(decode)?;
        let hash = transaction_hash_hex(&envelope, self.network).map_err(decode)?;
        let source = envelope_source(&envelope).map_err(decode)?;
        let payments = envelope_payments(&envelope).map_err(decode)?;
        let memo = match envelope_memo(&envelope).map_err(decode)? {
            EnvelopeMemo::None => RecordMemo::None,
            EnvelopeMemo::Text(text) => RecordMemo::Text(text),
            EnvelopeMemo::Id(id) => RecordMemo::Id(id.to_string()),
            EnvelopeMemo::Hash(key) => RecordMemo::Hash(key),
            EnvelopeMemo::Return(key) => RecordMemo::Return(key),
        };

        let mut state = self.state.lock();
        if let Some(operations) = state.submit_failures.pop_front() {
            return Err(HorizonError::TransactionFailed {
                transaction: "tx_failed".to_string(),
                operations,
            });
        }

        let required = state
            .accounts
            .get(&source)
            .map(|a| usize::from(a.thresholds.med_threshold.max(1)))
            .unwrap_or(1);
        if signature_count(&envelope) < required {
            return Err(HorizonError::TransactionFailed {
                transaction: "tx_bad_auth".to_string(),
                operations: vec![],
            });
        }

        let token = state.next_token();
        let applied = record(&hash, &source, &memo, token.clone(), Some(envelope_xdr.to_string()));
        state.append(&source, applied.clone());

        let issuer = self.network.tft_issuer();
        let mut effects = Vec::new();
        for payment in &payments {
            effects.push(tft_effect("account_debited", &source, payment.amount, issuer));
            effects.push(tft_effect("account_credited", &payment.destination, payment.amount, issuer));
            if payment.destination != source {
                state.append(&payment.destination, applied.clone());
            }
        }
        state.effects.insert(hash.clone(), effects);

        if let Some(account) = state.accounts.get_mut(&source) {
            let sequence: i64 = account.sequence.parse().unwrap_or_default();
            account.sequence = (sequence + 1).to_string();
        }
        state.submitted.push(envelope);

        Ok(SubmitResponse {
            hash,
            paging_token: Some(token),
        })
    }
}

/// A cosigner set that signs every Stellar request without checking it.
#[derive(Debug, Clone)]
pub struct StaticCollector {
    network: StellarNetwork,
    signers: Vec<VaultKeypair>,
}

impl StaticCollector {
    /// Creates a collector answering with a signature from each of `signers`.
    pub fn new(network: StellarNetwork, signers: Vec<VaultKeypair>) -> Self {
        Self { network, signers }
    }
}

#[async_trait]
impl SignatureCollector for StaticCollector {
    async fn collect(
        &self,
        request: SigningRequest,
        _cosigners: &[String],
        check: &SignatureCheck<'_>,
    ) -> Result<Vec<SignResponse>, RpcError> {
        let encoded = match &request {
            SigningRequest::Withdraw {
                encoded_stellar_tx, ..
            }
            | SigningRequest::Refund {
                encoded_stellar_tx, ..
            }
            | SigningRequest::FeeTransfer {
                encoded_stellar_tx, ..
            } => encoded_stellar_tx,
            SigningRequest::Mint(_) => {
                return Err(RpcError::invalid("not a stellar signing request"));
            }
        };
        let envelope = decode_envelope(encoded).map_err(RpcError::from)?;

        let responses = self
            .signers
            .iter()
            .map(|signer| {
                let signature =
                    sign_envelope(&envelope, signer, self.network).map_err(RpcError::from)?;
                Ok(SignResponse {
                    signer_address: signer.address().to_string(),
                    base64_signature: STANDARD.encode(signature),
                })
            })
            .collect::<Result<Vec<_>, RpcError>>()?;
        Ok(responses
            .into_iter()
            .filter(|response| check(&response.signer_address, response))
            .collect())
    }
}
