//! Overlay identities derived from Stellar keys.
//!
//! A node's libp2p key is its Stellar signing key, so every node can compute the peer id of a
//! cosigner from the cosigner's Stellar address alone.

use libp2p::{
    identity::{self, ed25519},
    PeerId,
};

use crate::errors::{P2PError, P2PResult};

/// Builds the overlay keypair from a 32-byte ed25519 seed.
pub fn keypair_from_seed(seed: [u8; 32]) -> P2PResult<ed25519::Keypair> {
    let mut bytes = seed;
    let secret = ed25519::SecretKey::try_from_bytes(&mut bytes)
        .map_err(|e| P2PError::Config(format!("invalid ed25519 seed: {e}")))?;
    Ok(ed25519::Keypair::from(secret))
}

/// Builds the overlay keypair from a Stellar secret seed (`S...`).
pub fn keypair_from_stellar_seed(seed: &str) -> P2PResult<ed25519::Keypair> {
    let secret = stellar_strkey::ed25519::PrivateKey::from_string(seed)
        .map_err(|_| P2PError::Config("stellar seed is not a valid secret seed".to_string()))?;
    keypair_from_seed(secret.0)
}

/// The peer id of a raw ed25519 public key.
pub fn peer_id_from_public_key(public_key: &[u8; 32]) -> P2PResult<PeerId> {
    let key = ed25519::PublicKey::try_from_bytes(public_key)
        .map_err(|e| P2PError::InvalidPeer(format!("invalid ed25519 key: {e}")))?;
    Ok(PeerId::from_public_key(&identity::PublicKey::from(key)))
}

/// The peer id of the node whose Stellar address is `address`.
pub fn peer_id_from_stellar_address(address: &str) -> P2PResult<PeerId> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(address)
        .map_err(|_| P2PError::InvalidPeer(format!("{address} is not a stellar address")))?;
    peer_id_from_public_key(&key.0)
}
