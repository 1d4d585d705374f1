//! Gathers cosigner signatures for vault transactions over the overlay.

use async_trait::async_trait;
use tft_bridge_p2p_service::SignerFanout;
use tft_bridge_primitives::{
    errors::RpcError,
    types::{MintSignResponse, SignResponse, SignerResponse, SigningRequest},
};
use tft_bridge_stellar::{SignatureCheck, SignatureCollector};
use tracing::warn;

/// Hands vault signing requests to the [`SignerFanout`].
#[derive(Debug, Clone)]
pub struct FanoutCollector {
    fanout: SignerFanout,
}

impl FanoutCollector {
    /// Creates a collector over `fanout`.
    pub const fn new(fanout: SignerFanout) -> Self {
        Self { fanout }
    }
}

#[async_trait]
impl SignatureCollector for FanoutCollector {
    async fn collect(
        &self,
        request: SigningRequest,
        cosigners: &[String],
        check: &SignatureCheck<'_>,
    ) -> Result<Vec<SignResponse>, RpcError> {
        let required = request.required_signatures();
        let responses = self
            .fanout
            .collect_verified(request, cosigners, required, |peer, response| {
                matches!(response, SignerResponse::Stellar(sig) if check(peer, sig))
            })
            .await?;
        Ok(stellar_signatures(responses))
    }
}

/// Keeps the Stellar signatures of `responses`.
pub(crate) fn stellar_signatures(responses: Vec<SignerResponse>) -> Vec<SignResponse> {
    responses
        .into_iter()
        .filter_map(|response| match response {
            SignerResponse::Stellar(sig) => Some(sig),
            SignerResponse::Mint(sig) => {
                warn!(signer = %sig.signer_address, "got a mint signature for a vault transaction");
                None
            }
        })
        .collect()
}

/// Keeps the mint signatures of `responses`.
pub(crate) fn mint_signatures(responses: Vec<SignerResponse>) -> Vec<MintSignResponse> {
    responses
        .into_iter()
        .filter_map(|response| match response {
            SignerResponse::Mint(sig) => Some(sig),
            SignerResponse::Stellar(sig) => {
                warn!(signer = %sig.signer_address, "got a vault signature for a mint");
                None
            }
        })
        .collect()
}
