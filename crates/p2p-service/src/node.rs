//! The swarm task: drives the overlay, answers inbound RPCs and routes outbound ones.

use std::{collections::HashMap, fmt, sync::Arc};

use futures::StreamExt;
use libp2p::{
    identify, relay,
    request_response::{self, Message, OutboundRequestId, ResponseChannel},
    swarm::SwarmEvent,
    Multiaddr, PeerId, Swarm,
};
use tft_bridge_primitives::{
    errors::RpcError,
    types::{DestinationIdResponse, SignerResponse},
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    behaviour::{BridgeBehaviour, BridgeBehaviourEvent},
    config::circuit_addr,
    errors::{P2PError, P2PResult},
    message_handler::Command,
    rpc::{IdRpcRequest, IdRpcResponse, SignerRpcRequest, SignerRpcResponse, SignerService},
};

/// An answer computed by a [`SignerService`] waiting to be written to its channel.
enum Reply {
    Sign(ResponseChannel<SignerRpcResponse>, SignerRpcResponse),
    Id(ResponseChannel<IdRpcResponse>, IdRpcResponse),
}

/// Owner of the swarm.
pub(crate) struct P2PNode {
    swarm: Swarm<BridgeBehaviour>,
    commands: mpsc::Receiver<Command>,
    service: Option<Arc<dyn SignerService>>,
    replies_tx: mpsc::UnboundedSender<Reply>,
    replies_rx: mpsc::UnboundedReceiver<Reply>,
    pending_sign: HashMap<OutboundRequestId, oneshot::Sender<P2PResult<SignerResponse>>>,
    pending_id: HashMap<OutboundRequestId, oneshot::Sender<P2PResult<DestinationIdResponse>>>,
    relay: Option<Multiaddr>,
    cancel: CancellationToken,
}

impl fmt::Debug for P2PNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("P2PNode")
            .field("local_peer_id", self.swarm.local_peer_id())
            .field("relay", &self.relay)
            .field("pending_sign", &self.pending_sign.len())
            .field("pending_id", &self.pending_id.len())
            .finish_non_exhaustive()
    }
}

impl P2PNode {
    pub(crate) fn new(
        swarm: Swarm<BridgeBehaviour>,
        commands: mpsc::Receiver<Command>,
        service: Option<Arc<dyn SignerService>>,
        relay: Option<Multiaddr>,
        cancel: CancellationToken,
    ) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            swarm,
            commands,
            service,
            replies_tx,
            replies_rx,
            pending_sign: HashMap::new(),
            pending_id: HashMap::new(),
            relay,
            cancel,
        }
    }

    /// Runs the node until cancelled.
    pub(crate) async fn listen(mut self) {
        info!(peer_id = %self.swarm.local_peer_id(), "p2p node started");
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("p2p node shutting down");
                    break;
                }
                Some(reply) = self.replies_rx.recv() => self.send_reply(reply),
                Some(command) = self.commands.recv() => self.handle_command(command),
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Sign {
                peer,
                request,
                respond,
            } => {
                self.ensure_route(peer);
                let id = self
                    .swarm
                    .behaviour_mut()
                    .signer
                    .send_request(&peer, SignerRpcRequest(request));
                self.pending_sign.insert(id, respond);
            }
            Command::DestinationId { peer, respond } => {
                self.ensure_route(peer);
                let id = self
                    .swarm
                    .behaviour_mut()
                    .sol_id
                    .send_request(&peer, IdRpcRequest);
                self.pending_id.insert(id, respond);
            }
        }
    }

    /// Makes `peer` dialable through the relay when there is no connection to it yet.
    fn ensure_route(&mut self, peer: PeerId) {
        if self.swarm.is_connected(&peer) {
            return;
        }
        if let Some(relay) = &self.relay {
            let addr = circuit_addr(relay, peer);
            trace!(%peer, %addr, "routing through relay");
            self.swarm.add_peer_address(peer, addr);
        }
    }

    fn send_reply(&mut self, reply: Reply) {
        let sent = match reply {
            Reply::Sign(channel, response) => self
                .swarm
                .behaviour_mut()
                .signer
                .send_response(channel, response)
                .is_ok(),
            Reply::Id(channel, response) => self
                .swarm
                .behaviour_mut()
                .sol_id
                .send_response(channel, response)
                .is_ok(),
        };
        if !sent {
            debug!("requester went away before the response was ready");
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<BridgeBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BridgeBehaviourEvent::Signer(event)) => self.on_signer_event(event),
            SwarmEvent::Behaviour(BridgeBehaviourEvent::SolId(event)) => self.on_id_event(event),
            SwarmEvent::Behaviour(BridgeBehaviourEvent::Relay(
                relay::client::Event::ReservationReqAccepted { relay_peer_id, .. },
            )) => {
                info!(%relay_peer_id, "relay reservation accepted");
            }
            SwarmEvent::Behaviour(BridgeBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                trace!(%peer_id, agent = %info.agent_version, "identified peer");
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(%peer_id, "connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                debug!(%peer_id, ?cause, "connection closed");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!(?peer_id, %error, "outgoing connection failed");
            }
            _ => {}
        }
    }

    fn on_signer_event(&mut self, event: request_response::Event<SignerRpcRequest, SignerRpcResponse>) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                Message::Request {
                    request, channel, ..
                } => {
                    debug!(%peer, kind = request.0.label(), "received signing request");
                    let service = self.service.clone();
                    let replies = self.replies_tx.clone();
                    tokio::spawn(async move {
                        let response = match service {
                            Some(service) => service.sign(request.0).await,
                            None => Err(RpcError::invalid("node does not sign requests")),
                        };
                        if let Err(e) = &response {
                            debug!(%peer, %e, "refusing signing request");
                        }
                        let _ = replies.send(Reply::Sign(channel, SignerRpcResponse(response)));
                    });
                }
                Message::Response {
                    request_id,
                    response,
                } => {
                    if let Some(respond) = self.pending_sign.remove(&request_id) {
                        let _ = respond.send(response.0.map_err(P2PError::Rejected));
                    }
                }
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                debug!(%peer, %error, "signing request failed");
                if let Some(respond) = self.pending_sign.remove(&request_id) {
                    let _ = respond.send(Err(P2PError::Outbound(error.to_string())));
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                warn!(%peer, %error, "failed to answer signing request");
            }
            request_response::Event::ResponseSent { peer, .. } => {
                trace!(%peer, "signing response sent");
            }
        }
    }

    fn on_id_event(&mut self, event: request_response::Event<IdRpcRequest, IdRpcResponse>) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                Message::Request { channel, .. } => {
                    debug!(%peer, "received destination id request");
                    let service = self.service.clone();
                    let replies = self.replies_tx.clone();
                    tokio::spawn(async move {
                        let response = match service {
                            Some(service) => service.destination_id().await,
                            None => Err(RpcError::invalid("node has no destination identity")),
                        };
                        let _ = replies.send(Reply::Id(channel, IdRpcResponse(response)));
                    });
                }
                Message::Response {
                    request_id,
                    response,
                } => {
                    if let Some(respond) = self.pending_id.remove(&request_id) {
                        let _ = respond.send(response.0.map_err(P2PError::Rejected));
                    }
                }
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                debug!(%peer, %error, "destination id request failed");
                if let Some(respond) = self.pending_id.remove(&request_id) {
                    let _ = respond.send(Err(P2PError::Outbound(error.to_string())));
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                warn!(%peer, %error, "failed to answer destination id request");
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }
}
