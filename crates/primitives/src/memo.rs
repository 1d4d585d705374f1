//! Memo keys and short ids.
//!
//! A [`MemoKey`] is the 32-byte payload of a Stellar hash or return memo. Every vault-originated
//! settlement carries one, and it links the settlement back to the event that caused it.

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding a memo key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoKeyError {
    /// The input is not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The input is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded payload does not have 32 bytes.
    #[error("memo key must be 32 bytes, got {0}")]
    Length(usize),
}

/// The 32 raw bytes of a hash or return memo, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoKey(#[serde(with = "hex::serde")] [u8; 32]);

impl MemoKey {
    /// Creates a new memo key from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the memo key.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Decodes a memo key from a byte slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MemoKeyError> {
        <[u8; 32]>::try_from(bytes)
            .map(Self)
            .map_err(|_| MemoKeyError::Length(bytes.len()))
    }

    /// Decodes a memo key from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, MemoKeyError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Decodes a memo key from the base64 rendering Horizon uses for hash and return memos.
    pub fn from_base64(s: &str) -> Result<Self, MemoKeyError> {
        let bytes = STANDARD.decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Returns the lowercase hex rendering of the memo key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MemoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MemoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoKey({})", self.to_hex())
    }
}

impl FromStr for MemoKey {
    type Err = MemoKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for MemoKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The 32-byte digest of a destination-chain event id that is used as the memo of the matching
/// Stellar payout.
pub type ShortId = MemoKey;

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_HEX: &str = "5d41402abc4b2a76b9719d911017c5925d41402abc4b2a76b9719d911017c592";

    #[test]
    fn hex_and_base64_agree() {
        let key = MemoKey::from_hex(HASH_HEX).unwrap();
        let b64 = STANDARD.encode(key.as_bytes());
        assert_eq!(MemoKey::from_base64(&b64).unwrap(), key);
        assert_eq!(key.to_string(), HASH_HEX);
    }

    #[test]
    fn accepts_prefixed_hex() {
        let prefixed = format!("0x{HASH_HEX}");
        assert_eq!(
            MemoKey::from_hex(&prefixed).unwrap(),
            MemoKey::from_hex(HASH_HEX).unwrap()
        );
    }

    #[test]
    fn renders_lowercase() {
        let key = MemoKey::from_hex(&HASH_HEX.to_uppercase()).unwrap();
        assert_eq!(key.to_hex(), HASH_HEX);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(MemoKey::from_hex("abcd"), Err(MemoKeyError::Length(2)));
        assert_eq!(
            MemoKey::from_base64("AAAA"),
            Err(MemoKeyError::Length(3))
        );
    }

    #[test]
    fn serializes_as_hex_string() {
        let key = MemoKey::from_hex(HASH_HEX).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{HASH_HEX}\""));
        assert_eq!(serde_json::from_str::<MemoKey>(&json).unwrap(), key);
    }
}
