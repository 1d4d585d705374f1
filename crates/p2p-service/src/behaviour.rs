//! The network behaviour of a bridge node.

use std::time::Duration;

use libp2p::{
    identify,
    identity::Keypair,
    ping, relay,
    request_response::{self, json, ProtocolSupport},
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
};

use crate::{
    constants::{IDENTIFY_PROTOCOL, SIGNER_PROTOCOL, SOL_ID_PROTOCOL},
    rpc::{IdRpcRequest, IdRpcResponse, SignerRpcRequest, SignerRpcResponse},
};

/// Behaviours combined into the bridge node's swarm.
#[derive(NetworkBehaviour)]
pub struct BridgeBehaviour {
    /// Circuit relay client, absent on the memory transport.
    pub relay: Toggle<relay::client::Behaviour>,

    /// Exchanges listen addresses with connected peers.
    pub identify: identify::Behaviour,

    /// Keeps connections alive.
    pub ping: ping::Behaviour,

    /// The `Sign` and `SignMint` RPCs.
    pub signer: json::Behaviour<SignerRpcRequest, SignerRpcResponse>,

    /// The `ID` RPC.
    pub sol_id: json::Behaviour<IdRpcRequest, IdRpcResponse>,
}

impl BridgeBehaviour {
    /// Creates the behaviour for `keypair`.
    pub fn new(
        keypair: &Keypair,
        relay: Option<relay::client::Behaviour>,
        request_timeout: Duration,
    ) -> Self {
        let config = request_response::Config::default().with_request_timeout(request_timeout);
        Self {
            relay: Toggle::from(relay),
            identify: identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTOCOL.to_string(),
                keypair.public(),
            )),
            ping: ping::Behaviour::new(ping::Config::new()),
            signer: json::Behaviour::new([(SIGNER_PROTOCOL, ProtocolSupport::Full)], config.clone()),
            sol_id: json::Behaviour::new([(SOL_ID_PROTOCOL, ProtocolSupport::Full)], config),
        }
    }
}
