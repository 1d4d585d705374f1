//! Fan-out of signing requests to the cosigner set.

use std::{sync::Arc, time::Duration};

use tft_bridge_primitives::{
    constants::{SIGNING_DEADLINE, SIGNING_POLL_INTERVAL},
    types::{SignerResponse, SigningRequest},
};
use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    task::JoinSet,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    errors::{P2PError, P2PResult},
    rpc::SignerTransport,
};

/// Sends a request to every cosigner at once and returns as soon as enough of them signed.
#[derive(Debug, Clone)]
pub struct SignerFanout {
    transport: Arc<dyn SignerTransport>,
    deadline: Duration,
    poll_interval: Duration,
}

impl SignerFanout {
    /// Creates a fan-out over `transport` with the default deadline and poll interval.
    pub fn new(transport: Arc<dyn SignerTransport>) -> Self {
        Self {
            transport,
            deadline: SIGNING_DEADLINE,
            poll_interval: SIGNING_POLL_INTERVAL,
        }
    }

    /// Overrides the overall deadline and the poll interval.
    pub const fn with_timing(mut self, deadline: Duration, poll_interval: Duration) -> Self {
        self.deadline = deadline;
        self.poll_interval = poll_interval;
        self
    }

    /// Sends `request` to all `cosigners` in parallel and returns once `required` of them signed.
    ///
    /// Refusals and transport failures of single cosigners are logged and otherwise ignored. The
    /// call fails with [`P2PError::ThresholdNotMet`] when the deadline passes, or earlier when
    /// every cosigner answered and too few signed. Requests still in flight when the call returns
    /// are aborted.
    pub async fn collect(
        &self,
        request: SigningRequest,
        cosigners: &[String],
        required: usize,
    ) -> P2PResult<Vec<SignerResponse>> {
        self.collect_verified(request, cosigners, required, |_, _| true)
            .await
    }

    /// Like [`Self::collect`], but only responses for which `accept(peer, response)` holds count
    /// towards `required`.
    ///
    /// A cosigner answering early with a bad signature is dropped and the call keeps waiting for
    /// the others.
    pub async fn collect_verified<F>(
        &self,
        request: SigningRequest,
        cosigners: &[String],
        required: usize,
        mut accept: F,
    ) -> P2PResult<Vec<SignerResponse>>
    where
        F: FnMut(&str, &SignerResponse) -> bool,
    {
        if required == 0 {
            return Ok(Vec::new());
        }

        let kind = request.label();
        let mut tasks = JoinSet::new();
        let mut pending = Vec::with_capacity(cosigners.len());
        for cosigner in cosigners {
            let (tx, rx) = oneshot::channel();
            let transport = self.transport.clone();
            let request = request.clone();
            let peer = cosigner.clone();
            tasks.spawn(async move {
                let _ = tx.send(transport.sign(&peer, request).await);
            });
            pending.push((cosigner.as_str(), rx));
        }
        info!(kind, peers = cosigners.len(), required, "sent signing requests");

        let deadline = Instant::now() + self.deadline;
        let mut responses = Vec::with_capacity(required);
        loop {
            pending.retain_mut(|(peer, rx)| match rx.try_recv() {
                Ok(Ok(response)) if accept(*peer, &response) => {
                    debug!(%peer, kind, "received signature");
                    responses.push(response);
                    false
                }
                Ok(Ok(_)) => {
                    warn!(%peer, kind, "dropping invalid signature");
                    false
                }
                Ok(Err(e)) => {
                    warn!(%peer, kind, %e, "cosigner did not sign");
                    false
                }
                Err(TryRecvError::Empty) => true,
                Err(TryRecvError::Closed) => {
                    warn!(%peer, kind, "cosigner request ended without an answer");
                    false
                }
            });

            if responses.len() >= required {
                return Ok(responses);
            }
            if pending.is_empty() || Instant::now() >= deadline {
                warn!(kind, got = responses.len(), required, "not enough signatures");
                return Err(P2PError::ThresholdNotMet {
                    got: responses.len(),
                    required,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Asks every cosigner for its destination-chain address.
    ///
    /// Returns `(stellar address, destination address)` for the cosigners that answered before
    /// the deadline.
    pub async fn destination_ids(&self, cosigners: &[String]) -> Vec<(String, String)> {
        let mut tasks = JoinSet::new();
        for cosigner in cosigners {
            let transport = self.transport.clone();
            let peer = cosigner.clone();
            tasks.spawn(async move {
                let result = transport.destination_id(&peer).await;
                (peer, result)
            });
        }

        let mut ids = Vec::with_capacity(cosigners.len());
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok((peer, Ok(id)))) => ids.push((peer, id.destination_chain_address)),
                    Some(Ok((peer, Err(e)))) => warn!(%peer, %e, "cosigner did not report its id"),
                    Some(Err(e)) => warn!(%e, "destination id task failed"),
                },
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use tft_bridge_primitives::{
        errors::RpcError,
        types::{DestinationIdResponse, SignResponse},
    };

    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Sign(Duration),
        Forge(Duration),
        Refuse,
        Hang,
    }

    #[derive(Debug)]
    struct ScriptedTransport {
        peers: HashMap<String, Behaviour>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(peers: &[(&str, Behaviour)]) -> Arc<Self> {
            Arc::new(Self {
                peers: peers.iter().map(|(p, b)| (p.to_string(), *b)).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SignerTransport for ScriptedTransport {
        async fn sign(&self, cosigner: &str, _request: SigningRequest) -> P2PResult<SignerResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.peers.get(cosigner).copied() {
                Some(Behaviour::Sign(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(SignerResponse::Stellar(SignResponse {
                        signer_address: cosigner.to_string(),
                        base64_signature: format!("sig-{cosigner}"),
                    }))
                }
                Some(Behaviour::Forge(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(SignerResponse::Stellar(SignResponse {
                        signer_address: cosigner.to_string(),
                        base64_signature: "forged".to_string(),
                    }))
                }
                Some(Behaviour::Refuse) => Err(P2PError::Rejected(RpcError::invalid("no"))),
                Some(Behaviour::Hang) | None => std::future::pending().await,
            }
        }

        async fn destination_id(&self, cosigner: &str) -> P2PResult<DestinationIdResponse> {
            match self.peers.get(cosigner) {
                Some(Behaviour::Sign(_) | Behaviour::Forge(_)) => Ok(DestinationIdResponse {
                    destination_chain_address: format!("sol-{cosigner}"),
                }),
                Some(Behaviour::Refuse) => Err(P2PError::Rejected(RpcError::invalid("no"))),
                _ => std::future::pending().await,
            }
        }
    }

    fn request() -> SigningRequest {
        SigningRequest::FeeTransfer {
            encoded_stellar_tx: "AAAA".to_string(),
            required_signatures: 2,
        }
    }

    fn names(peers: &[&str]) -> Vec<String> {
        peers.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_threshold_is_met() {
        let transport = ScriptedTransport::new(&[
            ("a", Behaviour::Sign(Duration::from_millis(10))),
            ("b", Behaviour::Refuse),
            ("c", Behaviour::Sign(Duration::from_millis(500))),
            ("d", Behaviour::Hang),
        ]);
        let fanout = SignerFanout::new(transport.clone());

        let started = Instant::now();
        let responses = fanout
            .collect(request(), &names(&["a", "b", "c", "d"]), 2)
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_after_the_deadline() {
        let transport = ScriptedTransport::new(&[
            ("a", Behaviour::Sign(Duration::ZERO)),
            ("b", Behaviour::Sign(Duration::ZERO)),
            ("c", Behaviour::Hang),
        ]);
        let fanout = SignerFanout::new(transport.clone());

        let started = Instant::now();
        let err = fanout
            .collect(request(), &names(&["a", "b", "c"]), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, P2PError::ThresholdNotMet { got: 2, required: 3 }));
        assert!(started.elapsed() >= SIGNING_DEADLINE);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_early_when_everyone_answered() {
        let transport = ScriptedTransport::new(&[
            ("a", Behaviour::Sign(Duration::ZERO)),
            ("b", Behaviour::Refuse),
        ]);
        let fanout = SignerFanout::new(transport);

        let started = Instant::now();
        let err = fanout
            .collect(request(), &names(&["a", "b"]), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, P2PError::ThresholdNotMet { got: 1, required: 2 }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    fn genuine(peer: &str, response: &SignerResponse) -> bool {
        matches!(response, SignerResponse::Stellar(sig) if sig.base64_signature == format!("sig-{peer}"))
    }

    #[tokio::test(start_paused = true)]
    async fn fast_bad_signature_does_not_take_a_slot() {
        let transport = ScriptedTransport::new(&[
            ("a", Behaviour::Forge(Duration::from_millis(10))),
            ("b", Behaviour::Sign(Duration::from_millis(200))),
            ("c", Behaviour::Sign(Duration::from_millis(500))),
        ]);
        let fanout = SignerFanout::new(transport.clone());

        let started = Instant::now();
        let responses = fanout
            .collect_verified(request(), &names(&["a", "b", "c"]), 2, genuine)
            .await
            .unwrap();

        let signers: Vec<_> = responses
            .iter()
            .map(|r| match r {
                SignerResponse::Stellar(sig) => sig.signer_address.clone(),
                SignerResponse::Mint(sig) => sig.signer_address.clone(),
            })
            .collect();
        assert_eq!(signers, names(&["b", "c"]));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < SIGNING_DEADLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_signatures_count_as_missing() {
        let transport = ScriptedTransport::new(&[
            ("a", Behaviour::Forge(Duration::ZERO)),
            ("b", Behaviour::Sign(Duration::ZERO)),
        ]);
        let fanout = SignerFanout::new(transport);

        let err = fanout
            .collect_verified(request(), &names(&["a", "b"]), 2, genuine)
            .await
            .unwrap_err();
        assert!(matches!(err, P2PError::ThresholdNotMet { got: 1, required: 2 }));
    }

    #[tokio::test]
    async fn nothing_to_collect() {
        let transport = ScriptedTransport::new(&[]);
        let fanout = SignerFanout::new(transport.clone());
        assert!(fanout.collect(request(), &[], 0).await.unwrap().is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gathers_destination_ids() {
        let transport = ScriptedTransport::new(&[
            ("a", Behaviour::Sign(Duration::ZERO)),
            ("b", Behaviour::Refuse),
            ("c", Behaviour::Hang),
        ]);
        let fanout = SignerFanout::new(transport);

        let ids = fanout.destination_ids(&names(&["a", "b", "c"])).await;
        assert_eq!(ids, vec![("a".to_string(), "sol-a".to_string())]);
    }
}
