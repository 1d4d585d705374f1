//! Layouts of the token accounts the bridge reads.

use solana_sdk::pubkey::Pubkey;

use super::programs::{ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID};
use crate::errors::{ChainError, ChainResult};

const MINT_BASE_LEN: usize = 82;
const MULTISIG_LEN: usize = 355;
const MAX_MULTISIG_SIGNERS: usize = 11;

/// The base state of a token mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintInfo {
    /// Account allowed to mint, if any.
    pub mint_authority: Option<Pubkey>,

    /// Decimals of the token.
    pub decimals: u8,

    /// Whether the mint was initialised.
    pub is_initialized: bool,
}

/// An m-of-n token multisig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigInfo {
    /// Number of signatures required.
    pub m: u8,

    /// Whether the multisig was initialised.
    pub is_initialized: bool,

    /// The `n` signers, in account order.
    pub signers: Vec<Pubkey>,
}

fn pubkey_at(data: &[u8], offset: usize) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(bytes)
}

/// Parses the base state of a mint account. Token-2022 extensions after the base are ignored.
pub fn parse_mint(data: &[u8]) -> ChainResult<MintInfo> {
    if data.len() < MINT_BASE_LEN {
        return Err(ChainError::Rpc(format!(
            "mint account has {} bytes, expected at least {MINT_BASE_LEN}",
            data.len()
        )));
    }
    let authority_tag = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let mint_authority = (authority_tag == 1).then(|| pubkey_at(data, 4));
    Ok(MintInfo {
        mint_authority,
        decimals: data[44],
        is_initialized: data[45] == 1,
    })
}

/// Parses a multisig account, or returns `None` if `data` is not one.
pub fn parse_multisig(data: &[u8]) -> Option<MultisigInfo> {
    if data.len() != MULTISIG_LEN {
        return None;
    }
    let n = (data[1] as usize).min(MAX_MULTISIG_SIGNERS);
    let signers = (0..n).map(|i| pubkey_at(data, 3 + 32 * i)).collect();
    Some(MultisigInfo {
        m: data[0],
        is_initialized: data[2] == 1,
        signers,
    })
}

/// The associated token-2022 account of `wallet` for `mint`.
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[wallet.as_ref(), TOKEN_2022_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_data(authority: Option<Pubkey>, decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; MINT_BASE_LEN + 20];
        if let Some(authority) = authority {
            data[0] = 1;
            data[4..36].copy_from_slice(authority.as_ref());
        }
        data[44] = decimals;
        data[45] = 1;
        data
    }

    #[test]
    fn parses_mint_with_extensions() {
        let authority = Pubkey::new_from_array([9; 32]);
        let info = parse_mint(&mint_data(Some(authority), 7)).unwrap();
        assert_eq!(info.mint_authority, Some(authority));
        assert_eq!(info.decimals, 7);
        assert!(info.is_initialized);

        let info = parse_mint(&mint_data(None, 7)).unwrap();
        assert_eq!(info.mint_authority, None);
        assert!(parse_mint(&[0u8; 10]).is_err());
    }

    #[test]
    fn parses_multisig() {
        let mut data = vec![0u8; MULTISIG_LEN];
        data[0] = 2;
        data[1] = 3;
        data[2] = 1;
        for i in 0..3 {
            data[3 + 32 * i..3 + 32 * (i + 1)].fill(i as u8 + 1);
        }

        let multisig = parse_multisig(&data).unwrap();
        assert_eq!(multisig.m, 2);
        assert!(multisig.is_initialized);
        assert_eq!(
            multisig.signers,
            vec![
                Pubkey::new_from_array([1; 32]),
                Pubkey::new_from_array([2; 32]),
                Pubkey::new_from_array([3; 32]),
            ]
        );
        assert!(parse_multisig(&[]).is_none());
    }

    #[test]
    fn associated_account_is_deterministic() {
        let wallet = Pubkey::new_from_array([4; 32]);
        let mint = Pubkey::new_from_array([5; 32]);
        let ata = associated_token_address(&wallet, &mint);
        assert_eq!(ata, associated_token_address(&wallet, &mint));
        assert_ne!(ata, associated_token_address(&mint, &wallet));
        assert_ne!(ata, wallet);
    }
}
