//! Data model shared between the leader, the followers and the chain adapters.

use serde::{Deserialize, Serialize};

use crate::memo::{MemoKey, ShortId};

/// A burn or withdraw of the bridged token observed on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    /// Full-width identifier of the event (EVM tx hash, Solana signature).
    pub event_id: String,

    /// The destination-chain account that burned the tokens.
    pub caller: String,

    /// Burned amount in stroops.
    pub amount: u64,

    /// The Stellar address the user wants to be paid out to.
    pub memo: String,

    /// Block height (EVM) or slot (Solana) of the event.
    pub block_height: u64,

    /// Digest of [`Self::event_id`] used as the memo of the Stellar payout.
    pub short_id: ShortId,

    /// Network the event targets, for chains whose events name one.
    #[serde(default)]
    pub network: Option<String>,
}

/// How a deposit memo was attached to a vault payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DepositMemo {
    /// A text memo, usually a destination address in its textual form.
    Text(String),

    /// A hash memo carrying 32 raw bytes.
    Hash(MemoKey),
}

/// A vault-bound TFT payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Hash of the Stellar transaction.
    pub tx_hash: String,

    /// The account that was debited.
    pub sender: String,

    /// Total TFT credited to the vault, in stroops.
    pub amount: u64,

    /// The memo identifying the destination address, if any.
    pub memo: Option<DepositMemo>,
}

/// A request to mint tokens on the destination chain for a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Destination-chain receiver, as normalised by the chain adapter.
    pub receiver: String,

    /// Amount to mint in stroops, i.e. the deposit minus the deposit fee.
    pub amount: u64,

    /// Hash of the Stellar deposit transaction.
    pub deposit_tx_hash: String,

    /// Number of cosigner signatures the leader needs.
    pub required_signatures: usize,

    /// The pre-built mint transaction for chains that sign a full transaction.
    pub encoded_mint_tx: Option<String>,
}

/// A request for a cosigner signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SigningRequest {
    /// Pay out a destination-chain burn on Stellar.
    Withdraw {
        /// Base64 XDR of the unsigned transaction envelope.
        encoded_stellar_tx: String,
        /// Number of cosigner signatures the leader needs.
        required_signatures: usize,
        /// Destination-chain account that burned the tokens.
        expected_receiver: String,
        /// Block at which the follower starts looking for the burn.
        expected_block_start: u64,
    },

    /// Refund a deposit that cannot be minted.
    Refund {
        /// Base64 XDR of the unsigned transaction envelope.
        encoded_stellar_tx: String,
        /// Number of cosigner signatures the leader needs.
        required_signatures: usize,
        /// Hex hash of the deposit being refunded.
        original_deposit_tx_hash_hex: String,
    },

    /// Move a fee to the fee wallet.
    FeeTransfer {
        /// Base64 XDR of the unsigned transaction envelope.
        encoded_stellar_tx: String,
        /// Number of cosigner signatures the leader needs.
        required_signatures: usize,
    },

    /// Mint tokens on the destination chain.
    Mint(MintRequest),
}

impl SigningRequest {
    /// Returns the number of signatures the leader asks for.
    pub const fn required_signatures(&self) -> usize {
        match self {
            SigningRequest::Withdraw {
                required_signatures,
                ..
            }
            | SigningRequest::Refund {
                required_signatures,
                ..
            }
            | SigningRequest::FeeTransfer {
                required_signatures,
                ..
            } => *required_signatures,
            SigningRequest::Mint(mint) => mint.required_signatures,
        }
    }

    /// Returns a short label used in logs.
    pub const fn label(&self) -> &'static str {
        match self {
            SigningRequest::Withdraw { .. } => "withdraw",
            SigningRequest::Refund { .. } => "refund",
            SigningRequest::FeeTransfer { .. } => "fee transfer",
            SigningRequest::Mint(_) => "mint",
        }
    }
}

/// A cosigner signature over a Stellar transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    /// Stellar address of the cosigner.
    pub signer_address: String,

    /// Base64 of the 64-byte ed25519 signature.
    pub base64_signature: String,
}

/// A cosigner signature over a destination-chain mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintSignResponse {
    /// Destination-chain address of the cosigner.
    pub signer_address: String,

    /// Hex of the signature bytes.
    pub partial_signature: String,

    /// Position of the signature in the mint transaction, for chains that need it.
    pub signer_index: Option<usize>,
}

/// The destination-chain identity of a cosigner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationIdResponse {
    /// Destination-chain address of the cosigner.
    pub destination_chain_address: String,
}

/// What a cosigner answers to a [`SigningRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerResponse {
    /// Signature over a Stellar transaction.
    Stellar(SignResponse),

    /// Signature over a destination-chain mint.
    Mint(MintSignResponse),
}
