//! Wire types of the signer RPCs and the seams on both ends of them.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tft_bridge_primitives::{
    errors::RpcError,
    types::{DestinationIdResponse, SignerResponse, SigningRequest},
};

use crate::errors::P2PResult;

/// Request of the signer protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRpcRequest(pub SigningRequest);

/// Response of the signer protocol: a signature or the reason it was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRpcResponse(pub Result<SignerResponse, RpcError>);

/// Request of the destination id protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdRpcRequest;

/// Response of the destination id protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRpcResponse(pub Result<DestinationIdResponse, RpcError>);

/// Answers signing requests received from the leader.
///
/// Implemented by the follower validation; the overlay only moves bytes.
#[async_trait]
pub trait SignerService: Send + Sync + fmt::Debug + 'static {
    /// Validates `request` and signs it, or explains the refusal.
    ///
    /// Both `Sign` and `SignMint` arrive here; [`SigningRequest::Mint`] is the latter.
    async fn sign(&self, request: SigningRequest) -> Result<SignerResponse, RpcError>;

    /// Returns this node's destination-chain address.
    async fn destination_id(&self) -> Result<DestinationIdResponse, RpcError>;
}

/// Delivers requests to a single cosigner, identified by its Stellar address.
#[async_trait]
pub trait SignerTransport: Send + Sync + fmt::Debug + 'static {
    /// Sends `request` to `cosigner` and waits for its answer.
    async fn sign(&self, cosigner: &str, request: SigningRequest) -> P2PResult<SignerResponse>;

    /// Asks `cosigner` for its destination-chain address.
    async fn destination_id(&self, cosigner: &str) -> P2PResult<DestinationIdResponse>;
}

#[cfg(test)]
mod tests {
    use tft_bridge_primitives::types::SignResponse;

    use super::*;

    #[test]
    fn responses_carry_refusals() {
        let ok = SignerRpcResponse(Ok(SignerResponse::Stellar(SignResponse {
            signer_address: "GA".to_string(),
            base64_signature: "c2ln".to_string(),
        })));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["Ok"]["stellar"]["signer_address"], "GA");

        let refused = SignerRpcResponse(Err(RpcError::invalid("amounts do not match")));
        let json = serde_json::to_string(&refused).unwrap();
        let decoded: SignerRpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, refused);
    }
}
