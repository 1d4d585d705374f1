//! Constants shared by every bridge component.
//!
//! Amounts are expressed in stroops unless stated otherwise.

use std::time::Duration;

/// Number of stroops in one TFT.
pub const STROOPS_PER_TFT: u64 = 10_000_000;

/// Number of decimal places of a TFT amount.
pub const TFT_DECIMALS: u8 = 7;

/// The fee kept by the bridge on every payout and refund.
pub const WITHDRAW_FEE: u64 = STROOPS_PER_TFT;

/// Default deposit fee in whole TFT.
pub const DEFAULT_DEPOSIT_FEE_TFT: u64 = 50;

/// Asset code of the bridged token on Stellar.
pub const TFT_ASSET_CODE: &str = "TFT";

/// Network name that EVM withdraw events must carry to be paid out on Stellar.
pub const BRIDGE_NETWORK: &str = "stellar";

/// Number of blocks an EVM withdraw event must be buried under before it is paid out.
pub const EVM_BLOCK_DELAY: u64 = 3;

/// Fixed back-off between attempts of a settlement (mint, refund, fee transfer, payout).
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Fixed back-off between attempts to fetch the Stellar cursor or a Horizon page.
pub const CURSOR_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Overall deadline for collecting cosigner signatures.
pub const SIGNING_DEADLINE: Duration = Duration::from_secs(30);

/// Interval between two passes over the per-peer signature channels.
pub const SIGNING_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deadline of a single Horizon request.
pub const HORIZON_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline of a destination-chain mint submission.
pub const MINT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(6 * 60);

/// Validity window of a built Stellar transaction, in seconds from build time.
pub const TX_TIMEOUT_SECS: u64 = 300;

/// Base fee per operation of a vault transaction, in stroops.
pub const BASE_FEE: u32 = STROOPS_PER_TFT as u32;

/// Page size used when scanning the vault account.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Page size used after a first overloaded response from Horizon.
pub const REDUCED_PAGE_LIMIT: u32 = 5;

/// Page size used while Horizon keeps reporting overload.
pub const MINIMUM_PAGE_LIMIT: u32 = 1;
