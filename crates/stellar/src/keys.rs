//! Stellar key handling.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use stellar_strkey::ed25519::{PrivateKey, PublicKey};

use crate::errors::{StellarError, StellarResult};

/// Decodes a Stellar `G...` address into the raw ed25519 public key.
pub fn decode_address(address: &str) -> StellarResult<[u8; 32]> {
    PublicKey::from_string(address)
        .map(|pk| pk.0)
        .map_err(|e| StellarError::InvalidKey(format!("{address}: {e:?}")))
}

/// Encodes a raw ed25519 public key as a Stellar `G...` address.
pub fn encode_address(public_key: &[u8; 32]) -> String {
    PublicKey(*public_key).to_string()
}

/// Whether `address` is a well-formed Stellar account address.
pub fn is_valid_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

/// Decodes a Stellar `S...` secret seed into the raw ed25519 secret key.
pub fn decode_seed(seed: &str) -> StellarResult<[u8; 32]> {
    PrivateKey::from_string(seed)
        .map(|sk| sk.0)
        .map_err(|_| StellarError::InvalidKey("secret seed is not a valid strkey".to_string()))
}

/// Verifies an ed25519 signature made by the owner of `address`.
pub fn verify_signature(address: &str, message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk) = decode_address(address) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&pk) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// The ed25519 key a bridge node signs vault transactions with.
#[derive(Clone)]
pub struct VaultKeypair {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for VaultKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKeypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl VaultKeypair {
    /// Creates the keypair from a Stellar secret seed.
    pub fn from_seed(seed: &str) -> StellarResult<Self> {
        Ok(Self::from_secret_bytes(decode_seed(seed)?))
    }

    /// Creates the keypair from raw secret key bytes.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let address = encode_address(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Returns the Stellar address of this key.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the raw public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Returns the raw secret key, used to derive the overlay identity.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Returns the signature hint Stellar attaches to decorated signatures.
    pub fn hint(&self) -> [u8; 4] {
        signature_hint(&self.public_key())
    }

    /// Signs `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// The last four bytes of a public key.
pub fn signature_hint(public_key: &[u8; 32]) -> [u8; 4] {
    [public_key[28], public_key[29], public_key[30], public_key[31]]
}
