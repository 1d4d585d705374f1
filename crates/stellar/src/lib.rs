//! Stellar side of the bridge.
//!
//! Contains the Horizon client seam, the in-memory index of vault transactions and the vault
//! wallet that builds, co-signs and submits payouts, refunds and fee transfers.

pub mod errors;
pub mod horizon;
pub mod keys;
pub mod memory;
pub mod wallet;
pub mod xdr;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use horizon::{Horizon, HorizonClient};
pub use keys::VaultKeypair;
pub use memory::{StoredTx, TxMemory};
pub use wallet::{SettlementKind, SignatureCheck, SignatureCollector, SubmitOutcome, VaultWallet};
