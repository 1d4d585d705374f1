//! Helpers for the overlay tests.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use libp2p::{build_multiaddr, identity::ed25519, Multiaddr, PeerId};
use tft_bridge_primitives::{
    errors::RpcError,
    types::{DestinationIdResponse, MintSignResponse, SignResponse, SignerResponse, SigningRequest},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::trace;

use crate::{
    bootstrap::bootstrap, config::TransportKind, identity::keypair_from_seed, Configuration,
    MessageHandler, SignerService,
};

/// Memory ports handed out to the nodes of all tests in this process.
static NEXT_PORT: AtomicU64 = AtomicU64::new(40_000);

/// A cosigner that signs Stellar requests and mints of at most 100 stroops.
#[derive(Debug)]
pub(crate) struct TestSigner {
    pub(crate) address: String,
}

#[async_trait]
impl SignerService for TestSigner {
    async fn sign(&self, request: SigningRequest) -> Result<SignerResponse, RpcError> {
        match request {
            SigningRequest::Mint(mint) if mint.amount > 100 => {
                Err(RpcError::invalid("amounts do not match"))
            }
            SigningRequest::Mint(mint) => Ok(SignerResponse::Mint(MintSignResponse {
                signer_address: self.address.clone(),
                partial_signature: mint.deposit_tx_hash,
                signer_index: None,
            })),
            other => Ok(SignerResponse::Stellar(SignResponse {
                signer_address: self.address.clone(),
                base64_signature: other.label().to_string(),
            })),
        }
    }

    async fn destination_id(&self) -> Result<DestinationIdResponse, RpcError> {
        Ok(DestinationIdResponse {
            destination_chain_address: format!("dest-{}", self.address),
        })
    }
}

/// Handle to a running test node.
#[derive(Debug)]
pub(crate) struct NodeHandle {
    pub(crate) handler: MessageHandler,
    pub(crate) peer_id: PeerId,
    pub(crate) stellar_address: String,
}

pub(crate) struct Setup {
    pub(crate) cancel: CancellationToken,
    pub(crate) nodes: Vec<NodeHandle>,
    pub(crate) tasks: TaskTracker,
}

impl Setup {
    /// Spawns `n` nodes over the memory transport, each knowing the address of every other.
    ///
    /// Node `i` answers requests when `signs(i)` holds.
    pub(crate) async fn all_to_all(n: usize, signs: impl Fn(usize) -> bool) -> anyhow::Result<Self> {
        let keypairs: Vec<ed25519::Keypair> = (0..n)
            .map(|i| keypair_from_seed([i as u8 + 1; 32]))
            .collect::<Result<_, _>>()?;
        let addrs: Vec<Multiaddr> = (0..n)
            .map(|_| build_multiaddr!(Memory(NEXT_PORT.fetch_add(1, Ordering::SeqCst))))
            .collect();
        let peer_ids: Vec<PeerId> = keypairs
            .iter()
            .map(|k| PeerId::from_public_key(&k.public().into()))
            .collect();
        trace!(?peer_ids, ?addrs, "setting up nodes");

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        let mut nodes = Vec::with_capacity(n);

        for (idx, keypair) in keypairs.into_iter().enumerate() {
            let stellar_address =
                stellar_strkey::ed25519::PublicKey(keypair.public().to_bytes()).to_string();
            let known_peers = peer_ids
                .iter()
                .cloned()
                .zip(addrs.iter().cloned())
                .enumerate()
                .filter(|(other, _)| *other != idx)
                .map(|(_, peer)| peer)
                .collect();

            let mut config = Configuration::new(keypair, addrs[idx].clone(), None, None);
            config.transport = TransportKind::Memory;
            config.known_peers = known_peers;
            config.request_timeout = Duration::from_secs(5);

            let service: Option<Arc<dyn SignerService>> = signs(idx).then(|| {
                Arc::new(TestSigner {
                    address: stellar_address.clone(),
                }) as Arc<dyn SignerService>
            });

            let handles = bootstrap(&config, service).await?;
            let node_cancel = handles.cancel.clone();
            let parent = cancel.clone();
            tasks.spawn(async move {
                parent.cancelled().await;
                node_cancel.cancel();
            });
            tasks.spawn(async move {
                let _ = handles.listen_task.await;
            });

            nodes.push(NodeHandle {
                handler: handles.handler,
                peer_id: peer_ids[idx],
                stellar_address,
            });
        }
        tasks.close();

        Ok(Self {
            cancel,
            nodes,
            tasks,
        })
    }

    /// Stops every node and waits for their tasks.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        self.tasks.wait().await;
    }
}
