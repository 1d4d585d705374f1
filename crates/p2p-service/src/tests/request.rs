//! Request-response tests over the memory transport.

use std::{sync::Arc, time::Duration};

use tft_bridge_common::logging::{self, LoggerConfig};
use tft_bridge_primitives::{
    errors::ErrorKind,
    types::{MintRequest, SignerResponse, SigningRequest},
};
use tokio::time::timeout;

use super::common::Setup;
use crate::{errors::P2PError, SignerFanout, SignerTransport};

const TEST_TIMEOUT: Duration = Duration::from_secs(20);

fn mint(amount: u64) -> SigningRequest {
    SigningRequest::Mint(MintRequest {
        receiver: "0x00000000000000000000000000000000000000ab".to_string(),
        amount,
        deposit_tx_hash: "aa".repeat(32),
        required_signatures: 1,
        encoded_mint_tx: None,
    })
}

/// A signing request reaches the cosigner and its signature comes back.
#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn sign_round_trip() -> anyhow::Result<()> {
    logging::init(LoggerConfig::new("p2p-service-test_sign_round_trip".to_string()));

    let setup = Setup::all_to_all(2, |_| true).await?;
    let leader = &setup.nodes[0];
    let cosigner = &setup.nodes[1];

    let request = SigningRequest::FeeTransfer {
        encoded_stellar_tx: "AAAA".to_string(),
        required_signatures: 1,
    };
    let response = timeout(
        TEST_TIMEOUT,
        leader.handler.request_signature(cosigner.peer_id, request),
    )
    .await??;

    match response {
        SignerResponse::Stellar(sig) => {
            assert_eq!(sig.signer_address, cosigner.stellar_address);
            assert_eq!(sig.base64_signature, "fee transfer");
        }
        other => panic!("unexpected response {other:?}"),
    }

    setup.shutdown().await;
    Ok(())
}

/// Refusals travel back verbatim, and nodes without a signer refuse everything.
#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn refusals_are_returned() -> anyhow::Result<()> {
    let setup = Setup::all_to_all(3, |i| i != 2).await?;
    let leader = &setup.nodes[0];

    let err = timeout(
        TEST_TIMEOUT,
        leader.handler.sign(&setup.nodes[1].stellar_address, mint(1_000)),
    )
    .await?
    .unwrap_err();
    match err {
        P2PError::Rejected(rpc) => {
            assert_eq!(rpc.kind, ErrorKind::InvalidRequest);
            assert_eq!(rpc.message, "amounts do not match");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = timeout(
        TEST_TIMEOUT,
        leader.handler.sign(&setup.nodes[2].stellar_address, mint(10)),
    )
    .await?
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    setup.shutdown().await;
    Ok(())
}

/// The fan-out gathers signatures from the cosigners that accept the request.
#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn fanout_over_the_overlay() -> anyhow::Result<()> {
    let setup = Setup::all_to_all(4, |i| i != 3).await?;
    let leader = &setup.nodes[0];
    let cosigners: Vec<String> = setup.nodes[1..]
        .iter()
        .map(|n| n.stellar_address.clone())
        .collect();

    let fanout = SignerFanout::new(Arc::new(leader.handler.clone()));
    let responses = timeout(TEST_TIMEOUT, fanout.collect(mint(10), &cosigners, 2)).await??;
    assert_eq!(responses.len(), 2);
    for response in responses {
        let SignerResponse::Mint(sig) = response else {
            panic!("expected a mint signature");
        };
        assert!(cosigners[..2].contains(&sig.signer_address));
    }

    let err = timeout(TEST_TIMEOUT, fanout.collect(mint(10), &cosigners, 3))
        .await?
        .unwrap_err();
    assert!(matches!(err, P2PError::ThresholdNotMet { got: 2, required: 3 }));

    let ids = timeout(TEST_TIMEOUT, fanout.destination_ids(&cosigners[..1])).await?;
    assert_eq!(
        ids,
        vec![(cosigners[0].clone(), format!("dest-{}", cosigners[0]))]
    );

    setup.shutdown().await;
    Ok(())
}
