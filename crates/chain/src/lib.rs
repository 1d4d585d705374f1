//! Destination-chain side of the bridge.
//!
//! Every chain the bridge mints on implements [`DestinationChain`]: it reports withdraw events,
//! knows which deposits were already minted, and builds, co-signs and submits mint transactions.
//! The EVM variant aggregates signed hashes into a multisig token contract; the Solana variant
//! collects signatures of a multi-signer transaction.

use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tft_bridge_primitives::{
    memo::ShortId,
    types::{BurnEvent, DepositMemo, MintRequest, MintSignResponse},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod errors;
pub mod evm;
pub mod solana;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{ChainError, ChainResult};
pub use evm::EvmChain;
pub use solana::SolanaChain;

/// The kind of destination chain a node is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// An EVM chain with the multisig token contract.
    Evm,

    /// Solana with a token-2022 mint owned by a multisig.
    Solana,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Evm => f.write_str("evm"),
            ChainKind::Solana => f.write_str("solana"),
        }
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evm" => Ok(ChainKind::Evm),
            "solana" => Ok(ChainKind::Solana),
            other => Err(format!("unknown destination chain: {other}")),
        }
    }
}

/// What a chain watcher reports to the leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A new block (or slot) head.
    Head(u64),

    /// A burn or withdraw of the bridged token.
    Withdraw(BurnEvent),
}

/// Lookup key of a withdraw event a cosigner is asked to pay out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLookup {
    /// The memo of the proposed payout.
    pub short_id: ShortId,

    /// Destination-chain account that is claimed to have burned the tokens.
    pub receiver: String,

    /// Block at which to start looking.
    pub block_start: u64,
}

/// The fields a cosigner extracts from a proposed mint before signing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintClaim {
    /// Account credited by the mint.
    pub receiver: String,

    /// Minted amount in stroops.
    pub amount: u64,

    /// Deposit hash the mint is tagged with.
    pub memo: String,
}

/// The capability set of a destination chain.
#[async_trait]
pub trait DestinationChain: Send + Sync + fmt::Debug {
    /// The kind of this chain.
    fn kind(&self) -> ChainKind;

    /// This node's address on the chain.
    fn own_address(&self) -> String;

    /// Number of blocks a withdraw event must be buried under before it is paid out.
    fn maturation_delay(&self) -> u64;

    /// Whether cosigners must report their chain address before a mint can be built.
    fn needs_signer_ids(&self) -> bool {
        false
    }

    /// Whether the chain node has caught up with the network.
    async fn is_synced(&self) -> ChainResult<bool>;

    /// The current block height or slot.
    async fn head(&self) -> ChainResult<u64>;

    /// Streams withdraw events from `from_height` on into `events` until `cancel` fires.
    ///
    /// Returns an error when the underlying subscription breaks; the caller resubscribes.
    async fn watch_events(
        &self,
        from_height: u64,
        events: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) -> ChainResult<()>;

    /// Whether a mint tagged with `deposit_tx_hash` is recorded on the chain.
    async fn is_settled(&self, deposit_tx_hash: &str) -> ChainResult<bool>;

    /// Number of cosigner signatures a mint needs besides this node's own.
    async fn required_signatures(&self) -> ChainResult<usize>;

    /// The chain's signer set in the order the chain expects signatures.
    async fn ordered_signer_set(&self) -> ChainResult<Vec<String>>;

    /// Converts a deposit memo into the normalised receiver of the mint.
    fn receiver_from_memo(&self, memo: &DepositMemo) -> ChainResult<String>;

    /// Like [`Self::receiver_from_memo`] but also checks on chain that the receiver can hold
    /// the token.
    async fn validate_receiver(&self, memo: &DepositMemo) -> ChainResult<String> {
        self.receiver_from_memo(memo)
    }

    /// Fills in whatever the chain needs cosigners to sign, given the chain addresses of the
    /// cosigners that are online.
    async fn prepare_mint(
        &self,
        request: MintRequest,
        online_signers: &[String],
    ) -> ChainResult<MintRequest>;

    /// Extracts what a proposed mint would do.
    fn decode_mint(&self, request: &MintRequest) -> ChainResult<MintClaim>;

    /// Signs a proposed mint with this node's key.
    async fn produce_partial_signature(&self, request: &MintRequest)
        -> ChainResult<MintSignResponse>;

    /// Checks one cosigner's signature over a proposed mint.
    ///
    /// `signer_set` is the result of [`Self::ordered_signer_set`].
    fn check_mint_signature(
        &self,
        request: &MintRequest,
        signer_set: &[String],
        response: &MintSignResponse,
    ) -> ChainResult<()>;

    /// Adds this node's signature to the cosigner signatures, checks them, and submits the mint.
    /// Returns the chain transaction id.
    async fn assemble_and_submit(
        &self,
        request: &MintRequest,
        signatures: Vec<MintSignResponse>,
    ) -> ChainResult<String>;

    /// Finds the withdraw event a payout with `lookup.short_id` would settle.
    async fn find_event(&self, lookup: &EventLookup) -> ChainResult<Option<BurnEvent>>;
}

/// Bounds a mint submission by `deadline`.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    what: &'static str,
    fut: impl std::future::Future<Output = ChainResult<T>>,
) -> ChainResult<T> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| ChainError::Timeout(what))?
}
