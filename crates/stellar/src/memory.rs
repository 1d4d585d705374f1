//! In-memory index of the vault account's transactions.
//!
//! The index is append-only and refreshed from Horizon by paging the account's transactions from
//! the last seen cursor. It answers the two dedup questions the bridge relies on: whether a given
//! transaction was already applied, and whether a vault-originated transaction with a given memo
//! key exists.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::RwLock;
use stellar_xdr::curr::TransactionEnvelope;
use tft_bridge_primitives::{memo::MemoKey, network::StellarNetwork};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    errors::{StellarError, StellarResult},
    horizon::{fetch_page, Horizon, PageLimit, RecordMemo, TransactionRecord},
    xdr::{decode_envelope, envelope_payments, transaction_hash_hex, Payment},
};

/// A vault transaction as remembered by [`TxMemory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTx {
    /// Transaction hash in hex.
    pub hash: String,

    /// Source account of the transaction.
    pub source_account: String,

    /// The transaction memo.
    pub memo: RecordMemo,

    /// Cursor of the transaction in the account's stream.
    pub paging_token: String,

    /// Whether the transaction was applied successfully.
    pub successful: bool,

    /// Payment operations, when the envelope was available and decodable.
    pub operations: Vec<Payment>,
}

impl From<&TransactionRecord> for StoredTx {
    fn from(record: &TransactionRecord) -> Self {
        let operations = record
            .envelope_xdr
            .as_deref()
            .map(|xdr| match decode_envelope(xdr).and_then(|env| envelope_payments(&env)) {
                Ok(payments) => payments,
                Err(e) => {
                    trace!(hash = %record.hash, %e, "envelope has no decodable payments");
                    Vec::new()
                }
            })
            .unwrap_or_default();

        Self {
            hash: record.hash.clone(),
            source_account: record.source_account.clone(),
            memo: record.typed_memo(),
            paging_token: record.paging_token.clone(),
            successful: record.successful,
            operations,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    by_hash: HashMap<String, StoredTx>,
    outgoing_memo_keys: HashSet<MemoKey>,
    cursor: String,
}

/// Index of the transactions of one Stellar account.
#[derive(Debug)]
pub struct TxMemory {
    horizon: Arc<dyn Horizon>,
    account: String,
    network: StellarNetwork,
    state: RwLock<MemoryState>,

    /// Keeps concurrent callers from paging the same range twice.
    scan_lock: Mutex<()>,

    /// Stops a scan waiting out an overloaded Horizon.
    cancel: CancellationToken,
}

impl TxMemory {
    /// Creates an empty index of `account` that scans from the beginning of its history.
    pub fn new(horizon: Arc<dyn Horizon>, account: impl Into<String>, network: StellarNetwork) -> Self {
        Self {
            horizon,
            account: account.into(),
            network,
            state: RwLock::new(MemoryState::default()),
            scan_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts scans stuck on an overloaded Horizon once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The indexed account.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The Stellar network of the indexed account.
    pub const fn network(&self) -> StellarNetwork {
        self.network
    }

    /// The paging token of the last scanned transaction.
    pub fn cursor(&self) -> String {
        self.state.read().cursor.clone()
    }

    /// Number of remembered transactions.
    pub fn len(&self) -> usize {
        self.state.read().by_hash.len()
    }

    /// Whether no transaction has been remembered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the remembered transaction without touching Horizon.
    pub fn cached(&self, hash: &str) -> Option<StoredTx> {
        self.state.read().by_hash.get(hash).cloned()
    }

    /// Returns the transaction with `hash`, rescanning once if it is not known yet.
    pub async fn get_tx(&self, hash: &str) -> StellarResult<StoredTx> {
        if let Some(tx) = self.cached(hash) {
            return Ok(tx);
        }
        self.scan().await?;
        self.cached(hash)
            .ok_or_else(|| StellarError::TransactionNotFound(hash.to_string()))
    }

    /// Whether the transaction of the given unsigned or signed envelope has been applied to the
    /// account.
    pub async fn tx_exists(&self, envelope: &TransactionEnvelope) -> StellarResult<bool> {
        let hash = transaction_hash_hex(envelope, self.network)?;
        self.tx_hash_exists(&hash).await
    }

    /// Whether a transaction with `hash` has been applied to the account.
    pub async fn tx_hash_exists(&self, hash: &str) -> StellarResult<bool> {
        self.scan().await?;
        Ok(self.state.read().by_hash.contains_key(hash))
    }

    /// Whether the account sent a transaction whose hash or return memo carries `key`.
    pub async fn memo_key_seen(&self, key: &MemoKey) -> StellarResult<bool> {
        self.scan().await?;
        Ok(self.state.read().outgoing_memo_keys.contains(key))
    }

    /// Remembers `tx`. Returns `false` if it was already known.
    pub fn store(&self, tx: StoredTx) -> bool {
        let mut state = self.state.write();
        if state.by_hash.contains_key(&tx.hash) {
            return false;
        }

        if tx.source_account == self.account {
            match &tx.memo {
                RecordMemo::Hash(key) | RecordMemo::Return(key) => {
                    state.outgoing_memo_keys.insert(*key);
                }
                RecordMemo::Undecodable(raw) => {
                    warn!(hash = %tx.hash, memo = %raw, "cannot decode memo of vault transaction");
                }
                _ => {}
            }
        }

        trace!(hash = %tx.hash, memo = ?tx.memo, "remembered transaction");
        state.by_hash.insert(tx.hash.clone(), tx);
        true
    }

    /// Pages through the account's transactions from the current cursor until Horizon returns an
    /// empty page. Returns the number of newly remembered transactions.
    pub async fn scan(&self) -> StellarResult<usize> {
        let _guard = self.scan_lock.lock().await;

        let mut limit = PageLimit::default();
        let mut added = 0;
        loop {
            let cursor = self.cursor();
            let records = fetch_page(
                self.horizon.as_ref(),
                &self.account,
                &cursor,
                &mut limit,
                &self.cancel,
            )
            .await?;
            let Some(last) = records.last() else {
                break;
            };
            let next_cursor = last.paging_token.clone();

            for record in &records {
                if self.store(StoredTx::from(record)) {
                    added += 1;
                }
            }
            self.state.write().cursor = next_cursor;
        }

        if added > 0 {
            info!(account = %self.account, added, cursor = %self.cursor(), "scanned vault transactions");
        } else {
            debug!(account = %self.account, "vault transactions up to date");
        }
        Ok(added)
    }
}
