//! The Horizon REST seam.
//!
//! [`Horizon`] is the narrow set of Horizon endpoints the bridge uses. [`HorizonClient`] is the
//! production implementation over `reqwest`.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tft_bridge_common::retry::sleep_or_cancel;
use tft_bridge_primitives::{
    constants::{
        CURSOR_RETRY_DELAY, DEFAULT_PAGE_LIMIT, HORIZON_TIMEOUT, MINIMUM_PAGE_LIMIT,
        REDUCED_PAGE_LIMIT,
    },
    memo::MemoKey,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{HorizonError, HorizonResult};

/// Number of effects requested for a single transaction.
const EFFECTS_LIMIT: u32 = 200;

/// A transaction as returned by Horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash in hex.
    pub hash: String,

    /// Whether the transaction was applied successfully.
    #[serde(default)]
    pub successful: bool,

    /// The source account of the transaction.
    pub source_account: String,

    /// One of `none`, `text`, `id`, `hash` or `return`.
    #[serde(default = "default_memo_type")]
    pub memo_type: String,

    /// The memo value; base64 for hash and return memos.
    #[serde(default)]
    pub memo: Option<String>,

    /// Cursor of this record in the account's transaction stream.
    pub paging_token: String,

    /// Base64 XDR of the transaction envelope.
    #[serde(default)]
    pub envelope_xdr: Option<String>,
}

fn default_memo_type() -> String {
    "none".to_string()
}

/// The memo of a transaction record in a typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMemo {
    /// No memo.
    None,
    /// A text memo.
    Text(String),
    /// An id memo.
    Id(String),
    /// A hash memo.
    Hash(MemoKey),
    /// A return memo.
    Return(MemoKey),
    /// A hash or return memo whose payload cannot be decoded.
    Undecodable(String),
}

impl TransactionRecord {
    /// Interprets the memo fields of the record.
    pub fn typed_memo(&self) -> RecordMemo {
        let value = self.memo.clone().unwrap_or_default();
        match self.memo_type.as_str() {
            "text" => RecordMemo::Text(value),
            "id" => RecordMemo::Id(value),
            "hash" => match MemoKey::from_base64(&value) {
                Ok(key) => RecordMemo::Hash(key),
                Err(_) => RecordMemo::Undecodable(value),
            },
            "return" => match MemoKey::from_base64(&value) {
                Ok(key) => RecordMemo::Return(key),
                Err(_) => RecordMemo::Undecodable(value),
            },
            _ => RecordMemo::None,
        }
    }
}

/// A single effect of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRecord {
    /// Effect type, e.g. `account_credited`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The account the effect applies to.
    pub account: String,

    /// Decimal amount, when applicable.
    #[serde(default)]
    pub amount: Option<String>,

    /// `native`, `credit_alphanum4` or `credit_alphanum12`.
    #[serde(default)]
    pub asset_type: Option<String>,

    /// Asset code for credit assets.
    #[serde(default)]
    pub asset_code: Option<String>,

    /// Asset issuer for credit assets.
    #[serde(default)]
    pub asset_issuer: Option<String>,
}

/// Signature thresholds of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Low threshold.
    pub low_threshold: u8,
    /// Medium threshold, which governs payments.
    pub med_threshold: u8,
    /// High threshold.
    pub high_threshold: u8,
}

/// A signer of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSigner {
    /// The signer key (a G-address for ed25519 signers).
    pub key: String,
    /// Weight of the signer.
    pub weight: u32,
    /// Signer type, e.g. `ed25519_public_key`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// An account as returned by Horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// The account address.
    pub account_id: String,
    /// Current sequence number, as a decimal string.
    pub sequence: String,
    /// Signature thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Signers of the account, including the master key.
    #[serde(default)]
    pub signers: Vec<AccountSigner>,
}

/// The response to a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Hash of the applied transaction.
    pub hash: String,
    /// Cursor of the transaction, when Horizon reports it.
    #[serde(default)]
    pub paging_token: Option<String>,
}

/// The Horizon endpoints used by the bridge.
#[async_trait]
pub trait Horizon: Send + Sync + fmt::Debug {
    /// Returns up to `limit` transactions of `account` after `cursor`, oldest first.
    async fn account_transactions(
        &self,
        account: &str,
        cursor: &str,
        limit: u32,
    ) -> HorizonResult<Vec<TransactionRecord>>;

    /// Returns the effects of a transaction.
    async fn transaction_effects(&self, hash: &str) -> HorizonResult<Vec<EffectRecord>>;

    /// Returns the state of an account.
    async fn account(&self, account: &str) -> HorizonResult<AccountRecord>;

    /// Submits a signed base64 XDR envelope.
    async fn submit_transaction(&self, envelope_xdr: &str) -> HorizonResult<SubmitResponse>;
}

#[derive(Debug, Deserialize)]
struct Embedded<T> {
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PageResponse<T> {
    #[serde(rename = "_embedded")]
    embedded: Embedded<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    #[serde(default)]
    transaction: String,
    #[serde(default)]
    operations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorExtras {
    #[serde(default)]
    result_codes: ResultCodes,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    extras: Option<ErrorExtras>,
}

/// Horizon client over HTTP.
#[derive(Debug, Clone)]
pub struct HorizonClient {
    base_url: String,
    client: Client,
}

impl HorizonClient {
    /// Creates a client for the Horizon instance at `base_url`.
    pub fn new(base_url: impl Into<String>) -> HorizonResult<Self> {
        let client = Client::builder().timeout(HORIZON_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> HorizonResult<T> {
        let status = response.status();
        match status {
            s if s.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| HorizonError::Decode(format!("{what}: {e}"))),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(HorizonError::Overloaded(status.as_u16()))
            }
            StatusCode::NOT_FOUND => Err(HorizonError::NotFound(what.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(HorizonError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl Horizon for HorizonClient {
    async fn account_transactions(
        &self,
        account: &str,
        cursor: &str,
        limit: u32,
    ) -> HorizonResult<Vec<TransactionRecord>> {
        let url = format!("{}/accounts/{account}/transactions", self.base_url);
        let mut query = vec![
            ("limit", limit.to_string()),
            ("order", "asc".to_string()),
        ];
        if !cursor.is_empty() {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self.client.get(url).query(&query).send().await?;
        let page: PageResponse<TransactionRecord> =
            Self::decode(response, "account transactions").await?;
        Ok(page.embedded.records)
    }

    async fn transaction_effects(&self, hash: &str) -> HorizonResult<Vec<EffectRecord>> {
        let url = format!("{}/transactions/{hash}/effects", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("limit", EFFECTS_LIMIT.to_string())])
            .send()
            .await?;
        let page: PageResponse<EffectRecord> = Self::decode(response, "transaction effects").await?;
        Ok(page.embedded.records)
    }

    async fn account(&self, account: &str) -> HorizonResult<AccountRecord> {
        let url = format!("{}/accounts/{account}", self.base_url);
        let response = self.client.get(url).send().await?;
        Self::decode(response, "account").await
    }

    async fn submit_transaction(&self, envelope_xdr: &str) -> HorizonResult<SubmitResponse> {
        let url = format!("{}/transactions", self.base_url);
        let response = self
            .client
            .post(url)
            .form(&[("tx", envelope_xdr)])
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body: ErrorResponse = response
                .json()
                .await
                .map_err(|e| HorizonError::Decode(format!("submit error: {e}")))?;
            let codes = body.extras.unwrap_or_default().result_codes;
            return Err(HorizonError::TransactionFailed {
                transaction: codes.transaction,
                operations: codes.operations,
            });
        }

        Self::decode(response, "submit transaction").await
    }
}

/// Page size state for scanning an account under Horizon overload.
///
/// Starts at [`DEFAULT_PAGE_LIMIT`], drops to [`REDUCED_PAGE_LIMIT`] then [`MINIMUM_PAGE_LIMIT`] on
/// consecutive overloaded responses, and resets after a successful page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit(u32);

impl Default for PageLimit {
    fn default() -> Self {
        Self(DEFAULT_PAGE_LIMIT)
    }
}

impl PageLimit {
    /// Current page size.
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Shrinks the page size after an overloaded response.
    pub fn reduce(&mut self) {
        self.0 = if self.0 > REDUCED_PAGE_LIMIT {
            REDUCED_PAGE_LIMIT
        } else {
            MINIMUM_PAGE_LIMIT
        };
    }

    /// Restores the default page size after a successful response.
    pub fn reset(&mut self) {
        self.0 = DEFAULT_PAGE_LIMIT;
    }
}

/// Fetches one page of `account`'s transactions after `cursor`.
///
/// Overloaded responses shrink `limit` and are retried after [`CURSOR_RETRY_DELAY`] unless
/// `cancel` fires first. Any other error is returned to the caller.
pub async fn fetch_page(
    horizon: &dyn Horizon,
    account: &str,
    cursor: &str,
    limit: &mut PageLimit,
    cancel: &CancellationToken,
) -> HorizonResult<Vec<TransactionRecord>> {
    loop {
        match horizon
            .account_transactions(account, cursor, limit.get())
            .await
        {
            Ok(records) => {
                limit.reset();
                debug!(%account, %cursor, count = records.len(), "fetched transactions");
                return Ok(records);
            }
            Err(HorizonError::Overloaded(status)) => {
                limit.reduce();
                warn!(%account, %status, limit = limit.get(), "horizon overloaded, retrying");
                sleep_or_cancel(cancel, CURSOR_RETRY_DELAY).await?;
            }
            Err(e) => return Err(e),
        }
    }
}
