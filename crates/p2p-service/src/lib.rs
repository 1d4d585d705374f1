//! TFT bridge signer overlay.
//!
//! A libp2p network of bridge nodes in which the leader asks cosigners to validate and sign
//! settlements. Each node's identity is its Stellar signing key.

pub mod behaviour;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod errors;
pub mod identity;
pub mod message_handler;
mod node;
pub mod rpc;
pub mod signers;

pub use bootstrap::{bootstrap, BootstrapHandles};
pub use config::{Configuration, TransportKind};
pub use errors::{P2PError, P2PResult};
pub use message_handler::MessageHandler;
pub use rpc::{SignerService, SignerTransport};
pub use signers::SignerFanout;

#[cfg(test)]
mod tests;
