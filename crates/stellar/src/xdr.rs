//! Building, inspecting and signing vault transaction envelopes.
//!
//! The bridge only ever builds v1 envelopes made of TFT payment operations, so the helpers here
//! reject anything else as malformed.

use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    AccountId, AlphaNum4, Asset, AssetCode4, DecoratedSignature, Hash, Limits, Memo, MuxedAccount,
    Operation, OperationBody, PaymentOp, Preconditions, PublicKey as XdrPublicKey, ReadXdr,
    SequenceNumber, Signature as XdrSignature, SignatureHint, TimeBounds, TimePoint, Transaction,
    TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV1Envelope, Uint256, WriteXdr,
};
use tft_bridge_primitives::{
    constants::{BASE_FEE, TFT_ASSET_CODE},
    memo::MemoKey,
    network::StellarNetwork,
};

use crate::{
    errors::{StellarError, StellarResult},
    keys::{decode_address, encode_address, signature_hint, VaultKeypair},
};

/// A payment operation in plain terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Destination account address.
    pub destination: String,

    /// Asset rendered as `CODE:ISSUER`, or `native`.
    pub asset: String,

    /// Amount in stroops.
    pub amount: u64,
}

impl Payment {
    /// Creates a TFT payment on `network`.
    pub fn tft(network: StellarNetwork, destination: impl Into<String>, amount: u64) -> Self {
        Self {
            destination: destination.into(),
            asset: tft_asset_name(network),
            amount,
        }
    }
}

/// The memo of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeMemo {
    /// No memo.
    None,
    /// A text memo.
    Text(String),
    /// An id memo.
    Id(u64),
    /// A hash memo.
    Hash(MemoKey),
    /// A return memo.
    Return(MemoKey),
}

impl EnvelopeMemo {
    /// Returns the memo key of hash and return memos.
    pub const fn memo_key(&self) -> Option<MemoKey> {
        match self {
            EnvelopeMemo::Hash(key) | EnvelopeMemo::Return(key) => Some(*key),
            _ => None,
        }
    }

    fn to_xdr(&self) -> StellarResult<Memo> {
        Ok(match self {
            EnvelopeMemo::None => Memo::None,
            EnvelopeMemo::Text(text) => Memo::Text(text.as_bytes().to_vec().try_into()?),
            EnvelopeMemo::Id(id) => Memo::Id(*id),
            EnvelopeMemo::Hash(key) => Memo::Hash(Hash(*key.as_bytes())),
            EnvelopeMemo::Return(key) => Memo::Return(Hash(*key.as_bytes())),
        })
    }
}

/// Renders the TFT asset of `network` as `CODE:ISSUER`.
pub fn tft_asset_name(network: StellarNetwork) -> String {
    format!("{TFT_ASSET_CODE}:{}", network.tft_issuer())
}

/// Renders an XDR asset as `CODE:ISSUER`, or `native`.
pub fn asset_name(asset: &Asset) -> String {
    let code = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .trim_end_matches('\0')
            .to_string()
    };
    let issuer = |id: &AccountId| match &id.0 {
        XdrPublicKey::PublicKeyTypeEd25519(Uint256(pk)) => encode_address(pk),
    };
    match asset {
        Asset::Native => "native".to_string(),
        Asset::CreditAlphanum4(a) => format!("{}:{}", code(&a.asset_code.0), issuer(&a.issuer)),
        Asset::CreditAlphanum12(a) => {
            format!("{}:{}", code(&a.asset_code.0), issuer(&a.issuer))
        }
    }
}

fn parse_asset(name: &str) -> StellarResult<Asset> {
    if name == "native" {
        return Ok(Asset::Native);
    }
    let (code, issuer) = name
        .split_once(':')
        .ok_or_else(|| StellarError::Malformed(format!("invalid asset {name}")))?;
    if code.is_empty() || code.len() > 4 {
        return Err(StellarError::Malformed(format!(
            "unsupported asset code {code}"
        )));
    }
    let mut asset_code = [0u8; 4];
    asset_code[..code.len()].copy_from_slice(code.as_bytes());
    Ok(Asset::CreditAlphanum4(AlphaNum4 {
        asset_code: AssetCode4(asset_code),
        issuer: account_id(issuer)?,
    }))
}

fn account_id(address: &str) -> StellarResult<AccountId> {
    Ok(AccountId(XdrPublicKey::PublicKeyTypeEd25519(Uint256(
        decode_address(address)?,
    ))))
}

fn muxed_account(address: &str) -> StellarResult<MuxedAccount> {
    Ok(MuxedAccount::Ed25519(Uint256(decode_address(address)?)))
}

fn muxed_address(account: &MuxedAccount) -> String {
    match account {
        MuxedAccount::Ed25519(Uint256(pk)) => encode_address(pk),
        MuxedAccount::MuxedEd25519(muxed) => encode_address(&muxed.ed25519.0),
    }
}

/// Builds an unsigned payment transaction from `source`.
///
/// `sequence` is the sequence number the transaction consumes, i.e. the account's current
/// sequence plus one. The fee is [`BASE_FEE`] per operation.
pub fn build_payment_transaction(
    source: &str,
    sequence: i64,
    memo: &EnvelopeMemo,
    payments: &[Payment],
    valid_until: u64,
) -> StellarResult<TransactionEnvelope> {
    if payments.is_empty() {
        return Err(StellarError::InvalidRequest(
            "a transaction needs at least one payment".to_string(),
        ));
    }

    let operations = payments
        .iter()
        .map(|p| {
            let amount = i64::try_from(p.amount)
                .map_err(|_| StellarError::InvalidRequest(format!("amount too large: {}", p.amount)))?;
            Ok(Operation {
                source_account: None,
                body: OperationBody::Payment(PaymentOp {
                    destination: muxed_account(&p.destination)?,
                    asset: parse_asset(&p.asset)?,
                    amount,
                }),
            })
        })
        .collect::<StellarResult<Vec<_>>>()?;

    let fee = BASE_FEE
        .checked_mul(operations.len() as u32)
        .ok_or_else(|| StellarError::InvalidRequest("fee overflow".to_string()))?;

    let tx = Transaction {
        source_account: muxed_account(source)?,
        fee,
        seq_num: SequenceNumber(sequence),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(valid_until),
        }),
        memo: memo.to_xdr()?,
        operations: operations.try_into()?,
        ext: TransactionExt::V0,
    };

    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: Vec::new().try_into()?,
    }))
}

/// Decodes a base64 XDR envelope.
pub fn decode_envelope(encoded: &str) -> StellarResult<TransactionEnvelope> {
    Ok(TransactionEnvelope::from_xdr_base64(encoded, Limits::none())?)
}

/// Encodes an envelope as base64 XDR.
pub fn encode_envelope(envelope: &TransactionEnvelope) -> StellarResult<String> {
    Ok(envelope.to_xdr_base64(Limits::none())?)
}

fn inner_transaction(envelope: &TransactionEnvelope) -> StellarResult<&Transaction> {
    match envelope {
        TransactionEnvelope::Tx(v1) => Ok(&v1.tx),
        _ => Err(StellarError::Malformed(
            "only v1 transaction envelopes are supported".to_string(),
        )),
    }
}

/// Returns the source account of the envelope.
pub fn envelope_source(envelope: &TransactionEnvelope) -> StellarResult<String> {
    Ok(muxed_address(&inner_transaction(envelope)?.source_account))
}

/// Computes the network-specific hash of the envelope's transaction.
pub fn transaction_hash(
    envelope: &TransactionEnvelope,
    network: StellarNetwork,
) -> StellarResult<[u8; 32]> {
    let tx = inner_transaction(envelope)?;
    let network_id: [u8; 32] = Sha256::digest(network.passphrase().as_bytes()).into();
    let payload = TransactionSignaturePayload {
        network_id: Hash(network_id),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Returns the hex rendering of [`transaction_hash`].
pub fn transaction_hash_hex(
    envelope: &TransactionEnvelope,
    network: StellarNetwork,
) -> StellarResult<String> {
    Ok(hex::encode(transaction_hash(envelope, network)?))
}

/// Extracts the memo of the envelope.
pub fn envelope_memo(envelope: &TransactionEnvelope) -> StellarResult<EnvelopeMemo> {
    Ok(match &inner_transaction(envelope)?.memo {
        Memo::None => EnvelopeMemo::None,
        Memo::Text(text) => EnvelopeMemo::Text(String::from_utf8_lossy(text.as_slice()).to_string()),
        Memo::Id(id) => EnvelopeMemo::Id(*id),
        Memo::Hash(Hash(bytes)) => EnvelopeMemo::Hash(MemoKey::new(*bytes)),
        Memo::Return(Hash(bytes)) => EnvelopeMemo::Return(MemoKey::new(*bytes)),
    })
}

/// Lists the payment operations of the envelope, failing if any other operation is present.
pub fn envelope_payments(envelope: &TransactionEnvelope) -> StellarResult<Vec<Payment>> {
    inner_transaction(envelope)?
        .operations
        .iter()
        .map(|op| match &op.body {
            OperationBody::Payment(payment) => Ok(Payment {
                destination: muxed_address(&payment.destination),
                asset: asset_name(&payment.asset),
                amount: u64::try_from(payment.amount).map_err(|_| {
                    StellarError::Malformed(format!("negative amount {}", payment.amount))
                })?,
            }),
            _ => Err(StellarError::Malformed(
                "transaction contains non payment operations".to_string(),
            )),
        })
        .collect()
}

/// Signs the envelope's transaction hash with `keypair` without attaching the signature.
pub fn sign_envelope(
    envelope: &TransactionEnvelope,
    keypair: &VaultKeypair,
    network: StellarNetwork,
) -> StellarResult<[u8; 64]> {
    let hash = transaction_hash(envelope, network)?;
    Ok(keypair.sign(&hash))
}

/// Attaches a signature by `public_key` to the envelope.
pub fn add_signature(
    envelope: &mut TransactionEnvelope,
    public_key: &[u8; 32],
    signature: &[u8; 64],
) -> StellarResult<()> {
    let TransactionEnvelope::Tx(v1) = envelope else {
        return Err(StellarError::Malformed(
            "only v1 transaction envelopes are supported".to_string(),
        ));
    };

    let mut signatures = v1.signatures.to_vec();
    signatures.push(DecoratedSignature {
        hint: SignatureHint(signature_hint(public_key)),
        signature: XdrSignature(signature.to_vec().try_into()?),
    });
    v1.signatures = signatures.try_into()?;
    Ok(())
}

/// Returns the number of signatures attached to the envelope.
pub fn signature_count(envelope: &TransactionEnvelope) -> usize {
    match envelope {
        TransactionEnvelope::Tx(v1) => v1.signatures.len(),
        TransactionEnvelope::TxV0(v0) => v0.signatures.len(),
        TransactionEnvelope::TxFeeBump(fb) => fb.signatures.len(),
    }
}
