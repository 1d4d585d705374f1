//! Outbound interface to the swarm task.

use async_trait::async_trait;
use libp2p::PeerId;
use tft_bridge_primitives::types::{DestinationIdResponse, SignerResponse, SigningRequest};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::{
    errors::{P2PError, P2PResult},
    identity::peer_id_from_stellar_address,
    rpc::SignerTransport,
};

/// A command for the swarm task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Send a `Sign` or `SignMint` request.
    Sign {
        peer: PeerId,
        request: SigningRequest,
        respond: oneshot::Sender<P2PResult<SignerResponse>>,
    },

    /// Send an `ID` request.
    DestinationId {
        peer: PeerId,
        respond: oneshot::Sender<P2PResult<DestinationIdResponse>>,
    },
}

/// Handle for sending requests through the overlay.
///
/// Cheap to clone; every clone talks to the same swarm task.
#[derive(Debug, Clone)]
pub struct MessageHandler {
    commands: mpsc::Sender<Command>,
    local_peer_id: PeerId,
}

impl MessageHandler {
    pub(crate) const fn new(commands: mpsc::Sender<Command>, local_peer_id: PeerId) -> Self {
        Self {
            commands,
            local_peer_id,
        }
    }

    /// The peer id of this node.
    pub const fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Sends a signing request to `peer`.
    pub async fn request_signature(
        &self,
        peer: PeerId,
        request: SigningRequest,
    ) -> P2PResult<SignerResponse> {
        trace!(%peer, kind = request.label(), "sending signing request");
        let (respond, response) = oneshot::channel();
        self.dispatch(Command::Sign {
            peer,
            request,
            respond,
        })
        .await?;
        response.await.map_err(|_| P2PError::Shutdown)?
    }

    /// Asks `peer` for its destination-chain address.
    pub async fn request_destination_id(&self, peer: PeerId) -> P2PResult<DestinationIdResponse> {
        trace!(%peer, "sending destination id request");
        let (respond, response) = oneshot::channel();
        self.dispatch(Command::DestinationId { peer, respond }).await?;
        response.await.map_err(|_| P2PError::Shutdown)?
    }

    async fn dispatch(&self, command: Command) -> P2PResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| P2PError::Shutdown)
    }
}

#[async_trait]
impl SignerTransport for MessageHandler {
    async fn sign(&self, cosigner: &str, request: SigningRequest) -> P2PResult<SignerResponse> {
        let peer = peer_id_from_stellar_address(cosigner)?;
        self.request_signature(peer, request).await
    }

    async fn destination_id(&self, cosigner: &str) -> P2PResult<DestinationIdResponse> {
        let peer = peer_id_from_stellar_address(cosigner)?;
        self.request_destination_id(peer).await
    }
}
