//! Recognising bridge burns and bridge mints among Solana transactions.

use blake2::{digest::consts::U32, Blake2b, Digest};
use solana_sdk::{
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, VersionedTransaction},
};
use tft_bridge_primitives::{constants::TFT_DECIMALS, memo::ShortId};
use thiserror::Error;

use super::programs::{
    decode_burn_checked, decode_memo, decode_mint_to_checked, CheckedAmount,
    COMPUTE_BUDGET_PROGRAM_ID, MEMO_PROGRAM_ID, TOKEN_2022_PROGRAM_ID,
};

type Blake2b256 = Blake2b<U32>;

/// Why a transaction is not a bridge burn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BurnRejection {
    /// A burn has two or three instructions.
    #[error("unexpected instruction count {0}")]
    InstructionCount(usize),

    /// An instruction of a program other than memo, token and compute budget.
    #[error("unexpected program {0}")]
    UnexpectedProgram(Pubkey),

    /// A token instruction other than `BurnChecked`.
    #[error("token instruction is not a checked burn")]
    NotBurnChecked,

    /// More than one memo or burn.
    #[error("duplicate {0} instruction")]
    Duplicate(&'static str),

    /// The memo or the burn is missing.
    #[error("missing {0} instruction")]
    Missing(&'static str),

    /// The memo is not UTF-8.
    #[error("memo is not valid utf-8")]
    InvalidMemo,

    /// The burn does not use the token's decimals.
    #[error("burn uses {0} decimals")]
    Decimals(u8),

    /// An account index points outside the transaction's static keys.
    #[error("unresolvable account index {0}")]
    UnresolvedAccount(u8),
}

/// An instruction with its program and accounts resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    /// The invoked program.
    pub program_id: Pubkey,

    /// Accounts passed to the program.
    pub accounts: Vec<Pubkey>,

    /// Instruction data.
    pub data: Vec<u8>,
}

/// A classified bridge burn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Burn {
    /// Burned amount and decimals.
    pub amount: CheckedAmount,

    /// Stellar address named in the memo.
    pub memo: String,

    /// The token account the tokens were burned from.
    pub source: Pubkey,

    /// The mint whose tokens were burned.
    pub mint: Pubkey,
}

/// The mint a proposed transaction performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintInstructionSet {
    /// Minted amount and decimals.
    pub amount: CheckedAmount,

    /// Deposit hash the mint is tagged with.
    pub memo: String,

    /// The credited token account.
    pub destination: Pubkey,

    /// The mint account.
    pub mint: Pubkey,
}

/// The short id of a Solana event: Blake2b-256 of the 64-byte transaction signature.
pub fn short_id(signature: &Signature) -> ShortId {
    let digest: [u8; 32] = Blake2b256::digest(signature.as_ref()).into();
    ShortId::new(digest)
}

fn resolve(
    keys: &[Pubkey],
    program_id_index: u8,
    accounts: &[u8],
    data: &[u8],
) -> Result<RawInstruction, BurnRejection> {
    let key = |index: u8| {
        keys.get(index as usize)
            .copied()
            .ok_or(BurnRejection::UnresolvedAccount(index))
    };
    Ok(RawInstruction {
        program_id: key(program_id_index)?,
        accounts: accounts.iter().map(|i| key(*i)).collect::<Result<_, _>>()?,
        data: data.to_vec(),
    })
}

/// Resolves the top-level instructions of a confirmed transaction.
pub fn versioned_instructions(
    tx: &VersionedTransaction,
) -> Result<Vec<RawInstruction>, BurnRejection> {
    let keys = tx.message.static_account_keys();
    tx.message
        .instructions()
        .iter()
        .map(|ix| resolve(keys, ix.program_id_index, &ix.accounts, &ix.data))
        .collect()
}

/// Resolves the instructions of a legacy transaction.
pub fn legacy_instructions(tx: &Transaction) -> Result<Vec<RawInstruction>, BurnRejection> {
    let keys = &tx.message.account_keys;
    tx.message
        .instructions
        .iter()
        .map(|ix| resolve(keys, ix.program_id_index, &ix.accounts, &ix.data))
        .collect()
}

/// Classifies a transaction as a bridge burn.
///
/// A burn consists of a memo naming the Stellar receiver and a token-2022 `BurnChecked`,
/// optionally preceded by a compute budget instruction. Anything else is rejected.
pub fn classify_burn(instructions: &[RawInstruction]) -> Result<Burn, BurnRejection> {
    if !(2..=3).contains(&instructions.len()) {
        return Err(BurnRejection::InstructionCount(instructions.len()));
    }

    let mut memo = None;
    let mut burn = None;
    for ix in instructions {
        if ix.program_id == MEMO_PROGRAM_ID {
            let text = decode_memo(&ix.data).ok_or(BurnRejection::InvalidMemo)?;
            if memo.replace(text).is_some() {
                return Err(BurnRejection::Duplicate("memo"));
            }
        } else if ix.program_id == TOKEN_2022_PROGRAM_ID {
            let amount = decode_burn_checked(&ix.data).ok_or(BurnRejection::NotBurnChecked)?;
            let (Some(source), Some(mint)) = (ix.accounts.first(), ix.accounts.get(1)) else {
                return Err(BurnRejection::Missing("burn accounts"));
            };
            if burn.replace((amount, *source, *mint)).is_some() {
                return Err(BurnRejection::Duplicate("burn"));
            }
        } else if ix.program_id != COMPUTE_BUDGET_PROGRAM_ID {
            return Err(BurnRejection::UnexpectedProgram(ix.program_id));
        }
    }

    let memo = memo.ok_or(BurnRejection::Missing("memo"))?;
    let (amount, source, mint) = burn.ok_or(BurnRejection::Missing("burn"))?;
    if amount.decimals != TFT_DECIMALS {
        return Err(BurnRejection::Decimals(amount.decimals));
    }
    Ok(Burn {
        amount,
        memo: memo.trim().to_string(),
        source,
        mint,
    })
}

/// Extracts the mint performed by a transaction the leader proposes.
///
/// The transaction must hold exactly a compute budget instruction, a memo and a token-2022
/// `MintToChecked`.
pub fn classify_mint(instructions: &[RawInstruction]) -> Result<MintInstructionSet, String> {
    if instructions.len() != 3 {
        return Err(format!("expected 3 instructions, got {}", instructions.len()));
    }

    let mut memo = None;
    let mut mint = None;
    let mut budget = false;
    for ix in instructions {
        if ix.program_id == MEMO_PROGRAM_ID && memo.is_none() {
            memo = Some(decode_memo(&ix.data).ok_or("memo is not valid utf-8")?);
        } else if ix.program_id == TOKEN_2022_PROGRAM_ID && mint.is_none() {
            let amount = decode_mint_to_checked(&ix.data).ok_or("token instruction is not a checked mint")?;
            let (Some(mint_account), Some(destination)) = (ix.accounts.first(), ix.accounts.get(1))
            else {
                return Err("mint instruction lacks accounts".to_string());
            };
            mint = Some((amount, *mint_account, *destination));
        } else if ix.program_id == COMPUTE_BUDGET_PROGRAM_ID && !budget {
            budget = true;
        } else {
            return Err(format!("unexpected instruction of program {}", ix.program_id));
        }
    }

    let memo = memo.ok_or("missing memo instruction")?;
    let (amount, mint, destination) = mint.ok_or("missing mint instruction")?;
    Ok(MintInstructionSet {
        amount,
        memo,
        destination,
        mint,
    })
}
