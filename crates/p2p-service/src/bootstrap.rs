//! Builds the swarm and starts the node.

use std::{sync::Arc, time::Duration};

use libp2p::{
    core::{
        muxing::StreamMuxerBox,
        transport::{upgrade::Version, Boxed, MemoryTransport},
        Transport,
    },
    identity::Keypair,
    multiaddr::Protocol,
    noise,
    pnet::{PnetConfig, PreSharedKey},
    tcp, yamux, PeerId, Swarm, SwarmBuilder,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    behaviour::BridgeBehaviour,
    config::{relay_peer_id, Configuration, TransportKind},
    constants::{COMMAND_CHANNEL_CAPACITY, TRANSPORT_UPGRADE_TIMEOUT},
    errors::{P2PError, P2PResult},
    message_handler::MessageHandler,
    node::P2PNode,
    rpc::SignerService,
};

/// Handles to a running node.
#[derive(Debug)]
pub struct BootstrapHandles {
    /// Sends requests through the node.
    pub handler: MessageHandler,

    /// Stops the node when cancelled.
    pub cancel: CancellationToken,

    /// The swarm task.
    pub listen_task: JoinHandle<()>,
}

fn transport_error(err: impl std::fmt::Display) -> P2PError {
    P2PError::Transport(err.to_string())
}

/// TCP, optionally wrapped in the private network handshake, then noise and yamux.
fn tcp_transport(
    keypair: &Keypair,
    psk: Option<[u8; 32]>,
) -> Result<Boxed<(PeerId, StreamMuxerBox)>, noise::Error> {
    let noise = noise::Config::new(keypair)?;
    let base = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true));
    let transport = match psk {
        Some(psk) => base
            .and_then(move |socket, _| PnetConfig::new(PreSharedKey::new(psk)).handshake(socket))
            .upgrade(Version::V1Lazy)
            .authenticate(noise)
            .multiplex(yamux::Config::default())
            .timeout(TRANSPORT_UPGRADE_TIMEOUT)
            .boxed(),
        None => base
            .upgrade(Version::V1Lazy)
            .authenticate(noise)
            .multiplex(yamux::Config::default())
            .timeout(TRANSPORT_UPGRADE_TIMEOUT)
            .boxed(),
    };
    Ok(transport)
}

fn memory_transport(keypair: &Keypair) -> Result<Boxed<(PeerId, StreamMuxerBox)>, noise::Error> {
    Ok(MemoryTransport::default()
        .upgrade(Version::V1)
        .authenticate(noise::Config::new(keypair)?)
        .multiplex(yamux::Config::default())
        .timeout(TRANSPORT_UPGRADE_TIMEOUT)
        .boxed())
}

/// Builds the swarm described by `config`.
pub fn build_swarm(config: &Configuration) -> P2PResult<Swarm<BridgeBehaviour>> {
    let keypair = Keypair::from(config.keypair.clone());
    let request_timeout = config.request_timeout;
    let idle: Duration = config.idle_connection_timeout;

    let swarm = match config.transport {
        TransportKind::Tcp => {
            let psk = config.psk;
            SwarmBuilder::with_existing_identity(keypair)
                .with_tokio()
                .with_other_transport(|key| {
                    tcp_transport(key, psk)
                        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
                })
                .map_err(transport_error)?
                .with_relay_client(noise::Config::new, yamux::Config::default)
                .map_err(transport_error)?
                .with_behaviour(|key, relay| BridgeBehaviour::new(key, Some(relay), request_timeout))
                .map_err(transport_error)?
                .with_swarm_config(|c| c.with_idle_connection_timeout(idle))
                .build()
        }
        TransportKind::Memory => SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_other_transport(|key| {
                memory_transport(key)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(transport_error)?
            .with_behaviour(|key| BridgeBehaviour::new(key, None, request_timeout))
            .map_err(transport_error)?
            .with_swarm_config(|c| c.with_idle_connection_timeout(idle))
            .build(),
    };
    Ok(swarm)
}

/// Starts a node.
///
/// Inbound `Sign`, `SignMint` and `ID` requests are answered by `service`; a node without one
/// refuses them. The returned task runs until the returned token is cancelled.
pub async fn bootstrap(
    config: &Configuration,
    service: Option<Arc<dyn SignerService>>,
) -> P2PResult<BootstrapHandles> {
    let mut swarm = build_swarm(config)?;
    let local_peer_id = *swarm.local_peer_id();

    swarm
        .listen_on(config.listening_addr.clone())
        .map_err(transport_error)?;

    for (peer, addr) in &config.known_peers {
        debug!(%peer, %addr, "adding known peer");
        swarm.add_peer_address(*peer, addr.clone());
    }

    if let Some(relay) = &config.relay {
        let relay_peer = relay_peer_id(relay)
            .ok_or_else(|| P2PError::Config(format!("relay {relay} lacks a /p2p/ peer id")))?;
        swarm.dial(relay.clone()).map_err(transport_error)?;
        swarm
            .listen_on(relay.clone().with(Protocol::P2pCircuit))
            .map_err(transport_error)?;
        info!(%relay_peer, "reserving a circuit on the relay");
    }

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let node = P2PNode::new(
        swarm,
        commands_rx,
        service,
        config.relay.clone(),
        cancel.clone(),
    );
    let listen_task = tokio::spawn(node.listen());

    Ok(BootstrapHandles {
        handler: MessageHandler::new(commands_tx, local_peer_id),
        cancel,
        listen_task,
    })
}
