//! Program ids and the few instructions the bridge builds and recognises.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

/// The token-2022 program that owns the bridged mint.
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// The SPL memo program.
pub const MEMO_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// The compute budget program.
pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ComputeBudget111111111111111111111111111111");

/// The associated token account program.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Compute units requested by a mint transaction.
pub const SOLANA_COMPUTE_UNIT_LIMIT: u32 = 40_000;

const SET_COMPUTE_UNIT_LIMIT_TAG: u8 = 2;
const MINT_TO_CHECKED_TAG: u8 = 14;
const BURN_CHECKED_TAG: u8 = 15;

/// Amount and decimals of a checked token instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedAmount {
    /// Raw token amount.
    pub amount: u64,

    /// Decimals the signer asserted.
    pub decimals: u8,
}

/// Builds a `SetComputeUnitLimit` instruction.
pub fn set_compute_unit_limit(units: u32) -> Instruction {
    let mut data = vec![SET_COMPUTE_UNIT_LIMIT_TAG];
    data.extend_from_slice(&units.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data,
    }
}

/// Builds a memo instruction signed by `signer`.
pub fn memo(text: &str, signer: &Pubkey) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![AccountMeta::new_readonly(*signer, true)],
        data: text.as_bytes().to_vec(),
    }
}

/// Builds a token-2022 `MintToChecked` instruction.
///
/// With an empty `signers` list the `authority` signs itself; otherwise it is a multisig account
/// and every entry of `signers` signs for it.
pub fn mint_to_checked(
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    signers: &[Pubkey],
    amount: CheckedAmount,
) -> Instruction {
    let mut data = vec![MINT_TO_CHECKED_TAG];
    data.extend_from_slice(&amount.amount.to_le_bytes());
    data.push(amount.decimals);

    let mut accounts = vec![
        AccountMeta::new(*mint, false),
        AccountMeta::new(*destination, false),
        AccountMeta::new_readonly(*authority, signers.is_empty()),
    ];
    accounts.extend(signers.iter().map(|s| AccountMeta::new_readonly(*s, true)));

    Instruction {
        program_id: TOKEN_2022_PROGRAM_ID,
        accounts,
        data,
    }
}

fn decode_checked(tag: u8, data: &[u8]) -> Option<CheckedAmount> {
    if data.len() != 10 || data[0] != tag {
        return None;
    }
    let mut amount = [0u8; 8];
    amount.copy_from_slice(&data[1..9]);
    Some(CheckedAmount {
        amount: u64::from_le_bytes(amount),
        decimals: data[9],
    })
}

/// Decodes the data of a `MintToChecked` instruction.
pub fn decode_mint_to_checked(data: &[u8]) -> Option<CheckedAmount> {
    decode_checked(MINT_TO_CHECKED_TAG, data)
}

/// Decodes the data of a `BurnChecked` instruction.
pub fn decode_burn_checked(data: &[u8]) -> Option<CheckedAmount> {
    decode_checked(BURN_CHECKED_TAG, data)
}

/// Decodes memo instruction data as UTF-8.
///
/// Older mint transactions carried a one-byte length prefix before a 64 character deposit hash;
/// both shapes are accepted.
pub fn decode_memo(data: &[u8]) -> Option<String> {
    let payload = match data.split_first() {
        Some((&len, rest)) if len as usize == rest.len() && rest.len() == 64 => rest,
        _ => data,
    };
    std::str::from_utf8(payload).ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_budget_layout() {
        let ix = set_compute_unit_limit(SOLANA_COMPUTE_UNIT_LIMIT);
        assert_eq!(ix.data, vec![2, 0x40, 0x9c, 0, 0]);
        assert!(ix.accounts.is_empty());
    }

    #[test]
    fn mint_to_checked_layout() {
        let mint = Pubkey::new_from_array([1; 32]);
        let dest = Pubkey::new_from_array([2; 32]);
        let authority = Pubkey::new_from_array([3; 32]);
        let signers = [Pubkey::new_from_array([4; 32]), Pubkey::new_from_array([5; 32])];
        let amount = CheckedAmount {
            amount: 500_000_000,
            decimals: 7,
        };

        let ix = mint_to_checked(&mint, &dest, &authority, &signers, amount);
        assert_eq!(ix.program_id, TOKEN_2022_PROGRAM_ID);
        assert_eq!(ix.accounts.len(), 5);
        assert!(ix.accounts[0].is_writable && ix.accounts[1].is_writable);
        assert!(!ix.accounts[2].is_signer);
        assert!(ix.accounts[3].is_signer && ix.accounts[4].is_signer);
        assert_eq!(decode_mint_to_checked(&ix.data), Some(amount));
        assert_eq!(decode_burn_checked(&ix.data), None);

        let single = mint_to_checked(&mint, &dest, &authority, &[], amount);
        assert_eq!(single.accounts.len(), 3);
        assert!(single.accounts[2].is_signer);
    }

    #[test]
    fn memo_accepts_length_prefix() {
        let hash = "ab".repeat(32);
        assert_eq!(decode_memo(hash.as_bytes()).as_deref(), Some(hash.as_str()));

        let mut prefixed = vec![64u8];
        prefixed.extend_from_slice(hash.as_bytes());
        assert_eq!(decode_memo(&prefixed).as_deref(), Some(hash.as_str()));

        assert_eq!(decode_memo(b"GABC").as_deref(), Some("GABC"));
        assert_eq!(decode_memo(&[0xff, 0xfe]), None);
    }
}
