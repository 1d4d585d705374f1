//! Errors of the signer overlay.

use tft_bridge_primitives::errors::{ErrorKind, RpcError};
use thiserror::Error;

/// Errors that can occur while talking to cosigners.
#[derive(Debug, Clone, Error)]
pub enum P2PError {
    /// A Stellar address or key cannot be turned into a peer identity.
    #[error("invalid peer: {0}")]
    InvalidPeer(String),

    /// The request could not be delivered or was not answered.
    #[error("outbound request failed: {0}")]
    Outbound(String),

    /// The cosigner answered with a refusal.
    #[error("peer refused: {0}")]
    Rejected(RpcError),

    /// The cosigner answered with a response of the wrong shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Fewer cosigners than required answered before the deadline.
    #[error("required number of signatures is not met: got {got}, need {required}")]
    ThresholdNotMet {
        /// Number of successful responses.
        got: usize,
        /// Number of responses needed.
        required: usize,
    },

    /// The swarm could not be built or could not listen.
    #[error("transport: {0}")]
    Transport(String),

    /// The overlay configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The swarm task is gone.
    #[error("p2p node is shut down")]
    Shutdown,
}

impl P2PError {
    /// Returns the kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            P2PError::Rejected(err) => err.kind,
            P2PError::ThresholdNotMet { .. } => ErrorKind::ThresholdNotMet,
            P2PError::InvalidPeer(_) => ErrorKind::InvalidRequest,
            P2PError::Config(_) => ErrorKind::Fatal,
            P2PError::Outbound(_)
            | P2PError::UnexpectedResponse(_)
            | P2PError::Transport(_)
            | P2PError::Shutdown => ErrorKind::Transient,
        }
    }
}

impl From<P2PError> for RpcError {
    fn from(err: P2PError) -> Self {
        match err {
            P2PError::Rejected(rpc) => rpc,
            other => RpcError::new(other.kind(), other.to_string()),
        }
    }
}

/// Convenience alias for overlay results.
pub type P2PResult<T> = Result<T, P2PError>;
