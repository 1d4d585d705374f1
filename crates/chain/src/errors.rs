//! Error types of the destination-chain adapters.

use tft_bridge_primitives::errors::{ErrorKind, RpcError};
use thiserror::Error;

/// Errors returned by a [`DestinationChain`](crate::DestinationChain).
#[derive(Debug, Error)]
pub enum ChainError {
    /// The deposit memo does not name an account that can receive the minted tokens.
    #[error("invalid receiver: {0}")]
    InvalidReceiver(String),

    /// The node is still catching up with the chain.
    #[error("destination chain node is syncing")]
    NotSynced,

    /// Fewer valid signatures than the chain requires were gathered.
    #[error("required number of signatures is not met: got {got}, need {required}")]
    ThresholdNotMet {
        /// Valid signatures gathered, including our own.
        got: usize,
        /// Signatures the chain requires.
        required: usize,
    },

    /// A mint request or mint transaction does not have the shape this adapter builds.
    #[error("malformed mint: {0}")]
    MalformedMint(String),

    /// This node's key is not a signer of the proposed mint.
    #[error("not a signer of the mint transaction")]
    NotASigner,

    /// Talking to the chain node failed.
    #[error("rpc: {0}")]
    Rpc(String),

    /// The mint was submitted but not confirmed in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The event subscription ended.
    #[error("event subscription closed")]
    SubscriptionClosed,

    /// A key could not be loaded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Cosigners refused or failed to sign.
    #[error("signing failed: {0}")]
    Signing(#[from] RpcError),
}

impl ChainError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InvalidReceiver(_) => ErrorKind::InvalidReceiver,
            ChainError::ThresholdNotMet { .. } => ErrorKind::ThresholdNotMet,
            ChainError::MalformedMint(_) | ChainError::NotASigner => ErrorKind::InvalidRequest,
            ChainError::InvalidKey(_) => ErrorKind::Fatal,
            ChainError::Signing(e) => e.kind,
            ChainError::NotSynced
            | ChainError::Rpc(_)
            | ChainError::Timeout(_)
            | ChainError::SubscriptionClosed => ErrorKind::Transient,
        }
    }

    /// Wraps any node client error.
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        ChainError::Rpc(err.to_string())
    }
}

impl From<ChainError> for RpcError {
    fn from(err: ChainError) -> Self {
        match err.kind() {
            ErrorKind::InvalidRequest | ErrorKind::InvalidReceiver => {
                RpcError::invalid(err.to_string())
            }
            _ => RpcError::new(
                ErrorKind::Transient,
                "signer failed to process the request",
            ),
        }
    }
}

/// Convenience alias for results of this crate.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_failures_are_hidden() {
        let err = RpcError::from(ChainError::Rpc("connection refused to 10.0.0.1".to_string()));
        assert_eq!(err.kind, ErrorKind::Transient);
        assert!(!err.message.contains("10.0.0.1"));

        let err = RpcError::from(ChainError::MalformedMint("memo missing".to_string()));
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(err.message.contains("memo missing"));
    }

    #[test]
    fn refund_triggering_kind() {
        assert!(ChainError::InvalidReceiver("bad".to_string())
            .kind()
            .triggers_refund());
        assert!(ChainError::NotSynced.kind().is_retryable());
    }
}
