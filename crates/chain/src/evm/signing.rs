//! Mint hashes, signatures and address handling of the EVM variant.

use base64::{engine::general_purpose::STANDARD, Engine};
use ethers::{
    abi::{self, Token},
    signers::{LocalWallet, Signer},
    types::{Address, RecoveryMessage, Signature, U256},
    utils::keccak256,
};
use tft_bridge_primitives::types::{DepositMemo, MintSignResponse};

use super::contract;
use crate::errors::{ChainError, ChainResult};

/// Renders an address as `0x`-prefixed lowercase hex.
pub fn address_string(address: &Address) -> String {
    format!("{address:#x}")
}

/// Parses an address given as 40 hex characters with or without `0x`.
pub fn parse_address(s: &str) -> ChainResult<Address> {
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_part).map_err(|e| ChainError::InvalidReceiver(format!("{s}: {e}")))?;
    address_from_bytes(&bytes)
}

fn address_from_bytes(bytes: &[u8]) -> ChainResult<Address> {
    if bytes.len() != Address::len_bytes() {
        return Err(ChainError::InvalidReceiver(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    let address = Address::from_slice(bytes);
    if address.is_zero() {
        return Err(ChainError::InvalidReceiver("zero address".to_string()));
    }
    Ok(address)
}

/// Decodes the receiver of a deposit memo.
///
/// The memo must be a text memo holding the 20 address bytes as hex or as base64.
pub fn receiver_from_memo(memo: &DepositMemo) -> ChainResult<Address> {
    let DepositMemo::Text(text) = memo else {
        return Err(ChainError::InvalidReceiver(
            "deposit memo must be a text memo".to_string(),
        ));
    };
    let text = text.trim();

    let hex_part = text.strip_prefix("0x").unwrap_or(text);
    if hex_part.len() == 2 * Address::len_bytes() {
        if let Ok(bytes) = hex::decode(hex_part) {
            return address_from_bytes(&bytes);
        }
    }

    let bytes = STANDARD
        .decode(text)
        .map_err(|e| ChainError::InvalidReceiver(format!("{text}: {e}")))?;
    address_from_bytes(&bytes)
}

/// The hash the contract signers sign for a mint.
pub fn mint_digest(receiver: Address, amount: u64, deposit_tx_hash: &str) -> [u8; 32] {
    keccak256(abi::encode(&[
        Token::Address(receiver),
        Token::Uint(U256::from(amount)),
        Token::String(deposit_tx_hash.to_string()),
    ]))
}

/// Signs a mint digest as an Ethereum signed message.
pub async fn sign_digest(wallet: &LocalWallet, digest: [u8; 32]) -> ChainResult<Signature> {
    wallet
        .sign_message(digest)
        .await
        .map_err(|e| ChainError::InvalidKey(e.to_string()))
}

fn parse_signature(signature_hex: &str) -> ChainResult<Signature> {
    let bytes = hex::decode(signature_hex.strip_prefix("0x").unwrap_or(signature_hex))
        .map_err(|e| ChainError::MalformedMint(format!("signature is not hex: {e}")))?;
    Signature::try_from(bytes.as_slice())
        .map_err(|e| ChainError::MalformedMint(format!("signature: {e}")))
}

fn recover(signature: &Signature, digest: [u8; 32]) -> ChainResult<Address> {
    signature
        .recover(RecoveryMessage::Data(digest.to_vec()))
        .map_err(|e| ChainError::MalformedMint(format!("signature does not recover: {e}")))
}

/// Recovers the signer of a hex-encoded 65-byte signature over `digest`.
pub fn recover_signer(signature_hex: &str, digest: [u8; 32]) -> ChainResult<Address> {
    recover(&parse_signature(signature_hex)?, digest)
}

/// Checks that `response` is a signature over `digest` by the address it claims, and that this
/// address is one of `signer_set`.
pub fn check_signature(
    digest: [u8; 32],
    signer_set: &[String],
    response: &MintSignResponse,
) -> ChainResult<(Address, Signature)> {
    let claimed = parse_address(&response.signer_address)
        .map_err(|e| ChainError::MalformedMint(e.to_string()))?;
    let signature = parse_signature(&response.partial_signature)?;
    let recovered = recover(&signature, digest)?;
    if recovered != claimed {
        return Err(ChainError::MalformedMint(format!(
            "signature of {} recovers to {}",
            address_string(&claimed),
            address_string(&recovered)
        )));
    }
    if !signer_set
        .iter()
        .any(|signer| parse_address(signer).is_ok_and(|signer| signer == claimed))
    {
        return Err(ChainError::MalformedMint(format!(
            "{} is not a contract signer",
            address_string(&claimed)
        )));
    }
    Ok((claimed, signature))
}

/// Converts a signature into the contract's `(v, r, s)` struct.
pub fn to_contract_signature(signature: &Signature) -> contract::Signature {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    signature.r.to_big_endian(&mut r);
    signature.s.to_big_endian(&mut s);
    contract::Signature {
        v: signature.v as u8,
        r,
        s,
    }
}

/// The placeholder the contract expects for a signer that did not sign.
pub fn empty_contract_signature() -> contract::Signature {
    contract::Signature {
        v: 0,
        r: [0; 32],
        s: [0; 32],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS_HEX: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    fn wallet(byte: u8) -> LocalWallet {
        LocalWallet::from_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn memo_accepts_hex_and_base64() {
        let expected = parse_address(ADDRESS_HEX).unwrap();
        let b64 = STANDARD.encode(expected.as_bytes());
        assert_eq!(b64.len(), 28);

        for text in [ADDRESS_HEX, &ADDRESS_HEX[2..], b64.as_str()] {
            let memo = DepositMemo::Text(text.to_string());
            assert_eq!(receiver_from_memo(&memo).unwrap(), expected);
        }
        assert_eq!(address_string(&expected), ADDRESS_HEX);
    }

    #[test]
    fn memo_rejects_bad_receivers() {
        let cases = [
            DepositMemo::Text("not an address".to_string()),
            DepositMemo::Text(STANDARD.encode([1u8; 19])),
            DepositMemo::Text(STANDARD.encode([0u8; 20])),
            DepositMemo::Hash([7; 32].into()),
        ];
        for memo in cases {
            assert!(matches!(
                receiver_from_memo(&memo),
                Err(ChainError::InvalidReceiver(_))
            ));
        }
    }

    #[tokio::test]
    async fn signatures_recover_to_signer() {
        let signer = wallet(1);
        let receiver = parse_address(ADDRESS_HEX).unwrap();
        let digest = mint_digest(receiver, 50, "abcd");

        let signature = sign_digest(&signer, digest).await.unwrap();
        let hex_sig = hex::encode(signature.to_vec());
        assert_eq!(signature.to_vec().len(), 65);
        assert_eq!(recover_signer(&hex_sig, digest).unwrap(), signer.address());

        let other = mint_digest(receiver, 51, "abcd");
        assert_ne!(recover_signer(&hex_sig, other).unwrap(), signer.address());
        assert!(recover_signer("zz", digest).is_err());
    }

    #[tokio::test]
    async fn signatures_are_checked_against_the_signer_set() {
        let (a, b, outsider) = (wallet(1), wallet(2), wallet(3));
        let receiver = parse_address(ADDRESS_HEX).unwrap();
        let digest = mint_digest(receiver, 50, "abcd");
        let signer_set = vec![address_string(&a.address()), address_string(&b.address())];

        let response = |claimed: Address, signature: Signature| MintSignResponse {
            signer_address: address_string(&claimed),
            partial_signature: hex::encode(signature.to_vec()),
            signer_index: None,
        };

        let good = sign_digest(&b, digest).await.unwrap();
        let (signer, _) = check_signature(digest, &signer_set, &response(b.address(), good)).unwrap();
        assert_eq!(signer, b.address());

        // a signature claimed by someone else
        assert!(check_signature(digest, &signer_set, &response(a.address(), good)).is_err());

        // a signature over another mint
        let stale = sign_digest(&b, mint_digest(receiver, 51, "abcd")).await.unwrap();
        assert!(check_signature(digest, &signer_set, &response(b.address(), stale)).is_err());

        // a valid signature of a key outside the contract's signer set
        let foreign = sign_digest(&outsider, digest).await.unwrap();
        assert!(
            check_signature(digest, &signer_set, &response(outsider.address(), foreign))
                .is_err()
        );

        let garbage = MintSignResponse {
            signer_address: address_string(&b.address()),
            partial_signature: "00".repeat(65),
            signer_index: None,
        };
        assert!(check_signature(digest, &signer_set, &garbage).is_err());
    }

    #[tokio::test]
    async fn contract_signature_layout() {
        let signature = sign_digest(&wallet(2), [3; 32]).await.unwrap();
        let converted = to_contract_signature(&signature);
        let bytes = signature.to_vec();
        assert_eq!(converted.r, bytes[0..32]);
        assert_eq!(converted.s, bytes[32..64]);
        assert_eq!(converted.v, bytes[64]);
        assert!(converted.v == 27 || converted.v == 28);
    }
}
