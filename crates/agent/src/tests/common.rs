//! A leader and its followers wired together in memory.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tft_bridge_chain::{test_utils::MockLedger, DestinationChain};
use tft_bridge_db::CursorStore;
use tft_bridge_p2p_service::{P2PError, P2PResult, SignerFanout, SignerService, SignerTransport};
use tft_bridge_primitives::{
    constants::STROOPS_PER_TFT,
    network::StellarNetwork,
    types::{DestinationIdResponse, SignerResponse, SigningRequest},
};
use tft_bridge_stellar::{test_utils::MockHorizon, TxMemory, VaultKeypair, VaultWallet};

use crate::{FanoutCollector, Follower, Leader, LeaderConfig};

pub(crate) const NETWORK: StellarNetwork = StellarNetwork::Testnet;
pub(crate) const DEPOSIT_FEE: u64 = 50 * STROOPS_PER_TFT;
pub(crate) const RECEIVER: &str = "0x00000000000000000000000000000000000000ab";

/// Delivers requests straight to the followers' services.
#[derive(Debug, Default)]
pub(crate) struct LoopbackTransport {
    services: HashMap<String, Arc<dyn SignerService>>,
    calls: AtomicUsize,
}

impl LoopbackTransport {
    /// Number of signing requests sent so far, delivered or not.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn service(&self, cosigner: &str) -> P2PResult<&Arc<dyn SignerService>> {
        self.services
            .get(cosigner)
            .ok_or_else(|| P2PError::Outbound(format!("{cosigner} is offline")))
    }
}

#[async_trait]
impl SignerTransport for LoopbackTransport {
    async fn sign(&self, cosigner: &str, request: SigningRequest) -> P2PResult<SignerResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.service(cosigner)?
            .sign(request)
            .await
            .map_err(P2PError::Rejected)
    }

    async fn destination_id(&self, cosigner: &str) -> P2PResult<DestinationIdResponse> {
        self.service(cosigner)?
            .destination_id()
            .await
            .map_err(P2PError::Rejected)
    }
}

/// A vault shared by `nodes` signers, node 0 leading.
pub(crate) struct Bridge {
    pub(crate) horizon: Arc<MockHorizon>,
    pub(crate) ledger: Arc<MockLedger>,
    pub(crate) transport: Arc<LoopbackTransport>,
    pub(crate) cursors: Arc<CursorStore>,
    pub(crate) keys: Vec<VaultKeypair>,
    pub(crate) fee_wallet: String,
    pub(crate) user: VaultKeypair,
    pub(crate) maturation_delay: u64,
    _cursor_dir: TempDir,
}

impl Bridge {
    /// Sets up `nodes` signers of which every one must sign, with followers in `online` reachable.
    pub(crate) fn new(
        nodes: usize,
        online: impl Fn(usize) -> bool,
        maturation_delay: u64,
    ) -> anyhow::Result<Self> {
        let keys: Vec<_> = (0..nodes)
            .map(|i| VaultKeypair::from_secret_bytes([i as u8 + 1; 32]))
            .collect();
        let fee_wallet = VaultKeypair::from_secret_bytes([90; 32]).address().to_string();
        let user = VaultKeypair::from_secret_bytes([80; 32]);
        let vault = keys[0].address().to_string();

        let horizon = Arc::new(MockHorizon::new(NETWORK));
        horizon.set_account(
            &vault,
            100,
            u8::try_from(nodes)?,
            keys.iter().map(|k| (k.address().to_string(), 1)).collect(),
        );
        let ledger = MockLedger::new((0..nodes).map(node_name).collect(), nodes);

        let mut transport = LoopbackTransport::default();
        for (i, key) in keys.iter().enumerate().skip(1).filter(|(i, _)| online(*i)) {
            let memory = Arc::new(TxMemory::new(horizon.clone(), vault.as_str(), NETWORK));
            let wallet = VaultWallet::new(
                horizon.clone(),
                memory,
                key.clone(),
                vault.as_str(),
                fee_wallet.as_str(),
            );
            let chain = ledger
                .chain(node_name(i))
                .with_maturation_delay(maturation_delay);
            let follower = Follower::new(wallet, Arc::new(chain), DEPOSIT_FEE);
            transport
                .services
                .insert(key.address().to_string(), Arc::new(follower));
        }

        let cursor_dir = tempfile::tempdir()?;
        let cursors = Arc::new(CursorStore::new(cursor_dir.path().join("cursors.json")));

        Ok(Self {
            horizon,
            ledger,
            transport: Arc::new(transport),
            cursors,
            keys,
            fee_wallet,
            user,
            maturation_delay,
            _cursor_dir: cursor_dir,
        })
    }

    pub(crate) fn vault(&self) -> &str {
        self.keys[0].address()
    }

    /// A fresh leader process over the shared chains and cursor file.
    pub(crate) fn leader(&self, config: LeaderConfig) -> Arc<Leader> {
        let fanout = SignerFanout::new(self.transport.clone())
            .with_timing(Duration::from_secs(2), Duration::from_millis(10));
        let memory = Arc::new(TxMemory::new(self.horizon.clone(), self.vault(), NETWORK));
        let wallet = VaultWallet::new(
            self.horizon.clone(),
            memory,
            self.keys[0].clone(),
            self.vault(),
            self.fee_wallet.as_str(),
        )
        .with_collector(Arc::new(FanoutCollector::new(fanout.clone())));
        let chain: Arc<dyn DestinationChain> = Arc::new(
            self.ledger
                .chain(node_name(0))
                .with_maturation_delay(self.maturation_delay),
        );

        Arc::new(Leader::new(
            self.horizon.clone(),
            wallet,
            chain,
            fanout,
            self.cursors.clone(),
            config,
        ))
    }

    pub(crate) fn config() -> LeaderConfig {
        LeaderConfig {
            deposit_fee: DEPOSIT_FEE,
            poll_interval: Duration::from_secs(1),
            ..LeaderConfig::default()
        }
    }
}

pub(crate) fn node_name(i: usize) -> String {
    format!("node-{i}")
}

/// Polls `done` every 100ms of virtual time, giving up after a minute.
pub(crate) async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..600 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    done()
}
