//! The error taxonomy shared by all bridge components.
//!
//! Every crate-level error maps into one [`ErrorKind`]; the kind decides the retry policy of the
//! caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of a failure, independent of where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network timeout, no peers, overloaded Horizon. Retried with a fixed back-off.
    Transient,

    /// A signing request does not match the on-chain truth. Never retried by the follower.
    InvalidRequest,

    /// The settlement already happened. Treated as success.
    AlreadySettled,

    /// The deposited amount does not cover the deposit fee. Triggers a refund.
    InsufficientDepositAmount,

    /// The destination-chain address cannot receive the tokens. Triggers a refund.
    InvalidReceiver,

    /// Fewer cosigner signatures than required arrived before the deadline.
    ThresholdNotMet,

    /// A transaction the request refers to is unknown.
    NotFound,

    /// Configuration or persistence cannot be used. Aborts the process.
    Fatal,
}

impl ErrorKind {
    /// Whether an operation failing with this kind should be attempted again after a back-off.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transient | ErrorKind::ThresholdNotMet | ErrorKind::NotFound
        )
    }

    /// Whether this kind triggers the refund sub-flow of a deposit.
    pub const fn triggers_refund(&self) -> bool {
        matches!(
            self,
            ErrorKind::InsufficientDepositAmount | ErrorKind::InvalidReceiver
        )
    }
}

/// The error a cosigner returns over the wire when it refuses to sign.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    /// The kind of the failure.
    pub kind: ErrorKind,

    /// A human readable description.
    pub message: String,
}

impl RpcError {
    /// Creates a new [`RpcError`].
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an [`ErrorKind::InvalidRequest`] error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }
}
