//! Configuration of the signer overlay.

use std::time::Duration;

use libp2p::{identity::ed25519, multiaddr::Protocol, Multiaddr, PeerId};

use crate::{
    constants::{DEFAULT_IDLE_CONNECTION_TIMEOUT, DEFAULT_REQUEST_TIMEOUT},
    errors::{P2PError, P2PResult},
};

/// The transport a node speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// TCP with the pre-shared key, noise and yamux, plus relayed circuits.
    #[default]
    Tcp,

    /// In-process memory transport, used by tests.
    Memory,
}

/// Configuration of a node of the signer overlay.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Keypair of the node, derived from its Stellar seed.
    pub keypair: ed25519::Keypair,

    /// Address the node listens on.
    pub listening_addr: Multiaddr,

    /// Relay the node reserves a circuit on and reaches other peers through.
    pub relay: Option<Multiaddr>,

    /// Pre-shared key of the private network.
    pub psk: Option<[u8; 32]>,

    /// Peers with a known direct address.
    pub known_peers: Vec<(PeerId, Multiaddr)>,

    /// The transport to build.
    pub transport: TransportKind,

    /// How long an idle connection is kept open.
    pub idle_connection_timeout: Duration,

    /// How long an outbound request may take.
    pub request_timeout: Duration,
}

impl Configuration {
    /// Creates a TCP configuration with the default timeouts.
    pub fn new(
        keypair: ed25519::Keypair,
        listening_addr: Multiaddr,
        relay: Option<Multiaddr>,
        psk: Option<[u8; 32]>,
    ) -> Self {
        Self {
            keypair,
            listening_addr,
            relay,
            psk,
            known_peers: Vec::new(),
            transport: TransportKind::Tcp,
            idle_connection_timeout: DEFAULT_IDLE_CONNECTION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// The peer id of this node.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.keypair.public().into())
    }
}

/// Parses a hex pre-shared key, which must be exactly 32 bytes.
pub fn parse_psk(hex_psk: &str) -> P2PResult<[u8; 32]> {
    let bytes = hex::decode(hex_psk.trim())
        .map_err(|e| P2PError::Config(format!("psk is not hex: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| P2PError::Config(format!("psk has {} bytes, expected 32", bytes.len())))
}

/// Parses a relay multiaddr, which must end in the relay's `/p2p/` peer id.
pub fn parse_relay(relay: &str) -> P2PResult<(Multiaddr, PeerId)> {
    let addr: Multiaddr = relay
        .parse()
        .map_err(|e| P2PError::Config(format!("relay {relay} is not a multiaddr: {e}")))?;
    let peer_id = relay_peer_id(&addr)
        .ok_or_else(|| P2PError::Config(format!("relay {relay} lacks a /p2p/ peer id")))?;
    Ok((addr, peer_id))
}

/// The peer id a multiaddr names, if any.
pub fn relay_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|protocol| match protocol {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

/// The address of `peer` behind the circuit relay at `relay`.
pub fn circuit_addr(relay: &Multiaddr, peer: PeerId) -> Multiaddr {
    relay
        .clone()
        .with(Protocol::P2pCircuit)
        .with(Protocol::P2p(peer))
}
