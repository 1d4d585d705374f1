//! An in-memory destination chain shared by several bridge nodes in tests.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tft_bridge_primitives::types::{BurnEvent, DepositMemo, MintRequest, MintSignResponse};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::{ChainError, ChainResult},
    ChainEvent, ChainKind, DestinationChain, EventLookup, MintClaim,
};

/// A mint recorded by the [`MockLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRecord {
    /// Credited account.
    pub receiver: String,

    /// Minted amount.
    pub amount: u64,

    /// Deposit the mint is tagged with.
    pub deposit_tx_hash: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    head: u64,
    events: Vec<BurnEvent>,
    mints: Vec<MintRecord>,
    submissions: usize,
    rejected_receivers: HashSet<String>,
}

/// State of the fake chain: its signer set, events and mints.
#[derive(Debug)]
pub struct MockLedger {
    signers: Vec<String>,
    required_total: usize,
    state: Mutex<LedgerState>,
    feed: mpsc::UnboundedSender<ChainEvent>,
    subscription: Mutex<Option<mpsc::UnboundedReceiver<ChainEvent>>>,
}

impl MockLedger {
    /// Creates a ledger whose mints need `required_total` signatures of `signers`.
    pub fn new(signers: Vec<String>, required_total: usize) -> Arc<Self> {
        let (feed, subscription) = mpsc::unbounded_channel();
        Arc::new(Self {
            signers,
            required_total,
            state: Mutex::new(LedgerState::default()),
            feed,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// A node of the chain signing as `address`.
    pub fn chain(self: &Arc<Self>, address: impl Into<String>) -> MockChain {
        MockChain {
            ledger: self.clone(),
            address: address.into(),
            maturation_delay: 0,
        }
    }

    /// Records a withdraw and reports it to the watcher.
    pub fn emit_withdraw(&self, event: BurnEvent) {
        self.state.lock().events.push(event.clone());
        let _ = self.feed.send(ChainEvent::Withdraw(event));
    }

    /// Advances the head and reports it to the watcher.
    pub fn advance_head(&self, head: u64) {
        self.state.lock().head = head;
        let _ = self.feed.send(ChainEvent::Head(head));
    }

    /// Records a mint as if it had been submitted by someone else.
    pub fn record_mint(&self, record: MintRecord) {
        self.state.lock().mints.push(record);
    }

    /// Makes `receiver` fail the on-chain receiver check.
    pub fn reject_receiver(&self, receiver: impl Into<String>) {
        self.state.lock().rejected_receivers.insert(receiver.into());
    }

    /// All recorded mints.
    pub fn mints(&self) -> Vec<MintRecord> {
        self.state.lock().mints.clone()
    }

    /// Number of mint submissions, successful or not.
    pub fn submissions(&self) -> usize {
        self.state.lock().submissions
    }

    fn signature(address: &str, request: &MintRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(address.as_bytes());
        hasher.update(request.receiver.to_lowercase().as_bytes());
        hasher.update(request.amount.to_be_bytes());
        hasher.update(request.deposit_tx_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// One node's view of a [`MockLedger`].
#[derive(Debug, Clone)]
pub struct MockChain {
    ledger: Arc<MockLedger>,
    address: String,
    maturation_delay: u64,
}

impl MockChain {
    /// Requires withdraws to be buried under `delay` blocks.
    pub fn with_maturation_delay(mut self, delay: u64) -> Self {
        self.maturation_delay = delay;
        self
    }

    /// The shared ledger.
    pub fn ledger(&self) -> &Arc<MockLedger> {
        &self.ledger
    }
}

/// Accepts `0x` followed by 40 hex characters, like an EVM address.
fn normalise_receiver(text: &str) -> ChainResult<String> {
    let valid = text.len() == 42
        && text.starts_with("0x")
        && text[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ChainError::InvalidReceiver(text.to_string()));
    }
    Ok(text.to_lowercase())
}

#[async_trait]
impl DestinationChain for MockChain {
    fn kind(&self) -> ChainKind {
        ChainKind::Evm
    }

    fn own_address(&self) -> String {
        self.address.clone()
    }

    fn maturation_delay(&self) -> u64 {
        self.maturation_delay
    }

    async fn is_synced(&self) -> ChainResult<bool> {
        Ok(true)
    }

    async fn head(&self) -> ChainResult<u64> {
        Ok(self.ledger.state.lock().head)
    }

    async fn watch_events(
        &self,
        _from_height: u64,
        events: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> ChainResult<()> {
        let mut feed = self
            .ledger
            .subscription
            .lock()
            .take()
            .ok_or(ChainError::SubscriptionClosed)?;

        let result = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                event = feed.recv() => event,
            };
            let Some(event) = event else {
                break Err(ChainError::SubscriptionClosed);
            };
            if events.send(event).await.is_err() {
                break Ok(());
            }
        };

        *self.ledger.subscription.lock() = Some(feed);
        result
    }

    async fn is_settled(&self, deposit_tx_hash: &str) -> ChainResult<bool> {
        Ok(self
            .ledger
            .state
            .lock()
            .mints
            .iter()
            .any(|m| m.deposit_tx_hash == deposit_tx_hash))
    }

    async fn required_signatures(&self) -> ChainResult<usize> {
        Ok(self.ledger.required_total.saturating_sub(1))
    }

    async fn ordered_signer_set(&self) -> ChainResult<Vec<String>> {
        Ok(self.ledger.signers.clone())
    }

    fn receiver_from_memo(&self, memo: &DepositMemo) -> ChainResult<String> {
        match memo {
            DepositMemo::Text(text) => normalise_receiver(text.trim()),
            DepositMemo::Hash(_) => Err(ChainError::InvalidReceiver(
                "deposit memo must be a text memo".to_string(),
            )),
        }
    }

    async fn validate_receiver(&self, memo: &DepositMemo) -> ChainResult<String> {
        let receiver = self.receiver_from_memo(memo)?;
        if self.ledger.state.lock().rejected_receivers.contains(&receiver) {
            return Err(ChainError::InvalidReceiver(format!(
                "{receiver} cannot hold the token"
            )));
        }
        Ok(receiver)
    }

    async fn prepare_mint(
        &self,
        request: MintRequest,
        _online_signers: &[String],
    ) -> ChainResult<MintRequest> {
        Ok(request)
    }

    fn decode_mint(&self, request: &MintRequest) -> ChainResult<MintClaim> {
        Ok(MintClaim {
            receiver: normalise_receiver(&request.receiver)
                .map_err(|e| ChainError::MalformedMint(e.to_string()))?,
            amount: request.amount,
            memo: request.deposit_tx_hash.clone(),
        })
    }

    async fn produce_partial_signature(
        &self,
        request: &MintRequest,
    ) -> ChainResult<MintSignResponse> {
        if !self.ledger.signers.contains(&self.address) {
            return Err(ChainError::NotASigner);
        }
        Ok(MintSignResponse {
            signer_address: self.address.clone(),
            partial_signature: MockLedger::signature(&self.address, request),
            signer_index: None,
        })
    }

    fn check_mint_signature(
        &self,
        request: &MintRequest,
        signer_set: &[String],
        response: &MintSignResponse,
    ) -> ChainResult<()> {
        let expected = MockLedger::signature(&response.signer_address, request);
        if !signer_set.contains(&response.signer_address) || response.partial_signature != expected {
            return Err(ChainError::MalformedMint(format!(
                "invalid signature of {}",
                response.signer_address
            )));
        }
        Ok(())
    }

    async fn assemble_and_submit(
        &self,
        request: &MintRequest,
        signatures: Vec<MintSignResponse>,
    ) -> ChainResult<String> {
        let own = self.produce_partial_signature(request).await?;
        let mut valid = HashSet::new();
        for response in signatures.iter().chain(std::iter::once(&own)) {
            let expected = MockLedger::signature(&response.signer_address, request);
            if self.ledger.signers.contains(&response.signer_address)
                && response.partial_signature == expected
            {
                valid.insert(response.signer_address.clone());
            }
        }

        let mut state = self.ledger.state.lock();
        state.submissions += 1;
        if valid.len() < self.ledger.required_total {
            return Err(ChainError::ThresholdNotMet {
                got: valid.len(),
                required: self.ledger.required_total,
            });
        }
        if state
            .mints
            .iter()
            .any(|m| m.deposit_tx_hash == request.deposit_tx_hash)
        {
            return Err(ChainError::Rpc("mint id already used".to_string()));
        }
        state.mints.push(MintRecord {
            receiver: request.receiver.to_lowercase(),
            amount: request.amount,
            deposit_tx_hash: request.deposit_tx_hash.clone(),
        });
        Ok(format!("0xmint{}", state.mints.len()))
    }

    async fn find_event(&self, lookup: &EventLookup) -> ChainResult<Option<BurnEvent>> {
        Ok(self
            .ledger
            .state
            .lock()
            .events
            .iter()
            .find(|e| {
                e.short_id == lookup.short_id
                    && e.caller == lookup.receiver
                    && e.block_height >= lookup.block_start
            })
            .cloned())
    }
}
