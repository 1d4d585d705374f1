//! Errors of the leader and the follower.

use tft_bridge_chain::ChainError;
use tft_bridge_db::errors::CursorError;
use tft_bridge_p2p_service::P2PError;
use tft_bridge_primitives::errors::{ErrorKind, RpcError};
use tft_bridge_stellar::errors::StellarError;
use thiserror::Error;

/// Errors that can occur while settling an event or validating a signing request.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The Stellar side failed.
    #[error("stellar: {0}")]
    Stellar(#[from] StellarError),

    /// The destination chain failed.
    #[error("destination chain: {0}")]
    Chain(#[from] ChainError),

    /// Talking to the cosigners failed.
    #[error("p2p: {0}")]
    P2P(#[from] P2PError),

    /// The cursor file could not be used.
    #[error("cursor: {0}")]
    Cursor(#[from] CursorError),

    /// A signing request does not match what is on chain.
    #[error("{0}")]
    InvalidRequest(String),

    /// The event a signing request refers to was already settled.
    #[error("{0}")]
    AlreadySettled(String),

    /// The deposit does not cover the deposit fee.
    #[error("deposit of {amount} does not cover the deposit fee of {fee}")]
    InsufficientDepositAmount {
        /// Deposited stroops.
        amount: u64,
        /// Deposit fee in stroops.
        fee: u64,
    },

    /// The destination-chain node is still syncing.
    #[error("destination chain is not synced yet")]
    NotSynced,
}

impl AgentError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Stellar(e) => e.kind(),
            AgentError::Chain(e) => e.kind(),
            AgentError::P2P(e) => e.kind(),
            AgentError::Cursor(e) => e.kind(),
            AgentError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AgentError::AlreadySettled(_) => ErrorKind::AlreadySettled,
            AgentError::InsufficientDepositAmount { .. } => ErrorKind::InsufficientDepositAmount,
            AgentError::NotSynced => ErrorKind::Transient,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AgentError::InvalidRequest(message.into())
    }
}

/// What a follower tells the leader when it refuses to sign.
///
/// Validation failures travel verbatim; anything else is reported as a generic transient failure.
impl From<AgentError> for RpcError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidRequest(message) => RpcError::invalid(message),
            AgentError::AlreadySettled(message) => RpcError::new(ErrorKind::AlreadySettled, message),
            AgentError::Stellar(e) => e.into(),
            AgentError::Chain(e) => e.into(),
            AgentError::P2P(e) => e.into(),
            AgentError::InsufficientDepositAmount { .. } => RpcError::invalid(err.to_string()),
            AgentError::Cursor(_) | AgentError::NotSynced => RpcError::new(
                ErrorKind::Transient,
                "signer failed to process the request",
            ),
        }
    }
}

/// Convenience alias for results of this crate.
pub type AgentResult<T> = Result<T, AgentError>;
