//! Error types of the Stellar side.

use tft_bridge_common::retry::Cancelled;
use tft_bridge_primitives::{
    amount::AmountError,
    errors::{ErrorKind, RpcError},
    memo::MemoKeyError,
};
use thiserror::Error;

/// Horizon operation result codes that mean the recipient cannot receive TFT.
pub const UNREACHABLE_RECIPIENT_CODES: [&str; 2] = ["op_no_destination", "op_no_trust"];

/// Errors returned by a [`Horizon`](crate::horizon::Horizon) implementation.
#[derive(Debug, Error)]
pub enum HorizonError {
    /// Horizon answered 503 or 504.
    #[error("horizon is overloaded (status {0})")]
    Overloaded(u16),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A submitted transaction was rejected.
    #[error("transaction failed: {transaction} {operations:?}")]
    TransactionFailed {
        /// Transaction result code.
        transaction: String,
        /// Per-operation result codes.
        operations: Vec<String>,
    },

    /// Any other non-success status.
    #[error("http status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The HTTP request itself failed.
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),

    /// Horizon returned a body that does not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Shutdown was requested while waiting to retry.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl HorizonError {
    /// Whether a submission failed because the recipient has no account or no TFT trustline.
    pub fn is_unreachable_recipient(&self) -> bool {
        match self {
            HorizonError::TransactionFailed { operations, .. } => operations
                .iter()
                .any(|code| UNREACHABLE_RECIPIENT_CODES.contains(&code.as_str())),
            _ => false,
        }
    }
}

/// Errors of the transaction memory and the vault wallet.
#[derive(Debug, Error)]
pub enum StellarError {
    /// Talking to Horizon failed.
    #[error("horizon: {0}")]
    Horizon(#[from] HorizonError),

    /// XDR encoding or decoding failed.
    #[error("xdr: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),

    /// A strkey could not be decoded.
    #[error("invalid stellar key: {0}")]
    InvalidKey(String),

    /// An amount could not be parsed.
    #[error("amount: {0}")]
    Amount(#[from] AmountError),

    /// A memo could not be decoded.
    #[error("memo: {0}")]
    Memo(#[from] MemoKeyError),

    /// A transaction does not have the shape the bridge builds.
    #[error("malformed transaction: {0}")]
    Malformed(String),

    /// The transaction is not known to the vault.
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// Cosigners refused or failed to sign.
    #[error("signing failed: {0}")]
    Signing(#[from] RpcError),

    /// Fewer signatures than required were gathered.
    #[error("required number of signatures is not met: got {got}, need {required}")]
    ThresholdNotMet {
        /// Valid signatures gathered.
        got: usize,
        /// Signatures required.
        required: usize,
    },

    /// The wallet was asked to do something that cannot be done.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl StellarError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StellarError::Horizon(HorizonError::NotFound(_))
            | StellarError::TransactionNotFound(_) => ErrorKind::NotFound,
            StellarError::Horizon(_) => ErrorKind::Transient,
            StellarError::Signing(e) => e.kind,
            StellarError::ThresholdNotMet { .. } => ErrorKind::ThresholdNotMet,
            StellarError::Xdr(_)
            | StellarError::InvalidKey(_)
            | StellarError::Amount(_)
            | StellarError::Memo(_)
            | StellarError::Malformed(_)
            | StellarError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Convenience alias for Horizon results.
pub type HorizonResult<T> = Result<T, HorizonError>;

/// Convenience alias for results of this crate.
pub type StellarResult<T> = Result<T, StellarError>;
