//! Exact conversions between decimal TFT amounts and integer stroops.
//!
//! Horizon renders amounts as decimal strings with seven fractional digits. These helpers never go
//! through floating point.

use thiserror::Error;

use crate::constants::{STROOPS_PER_TFT, TFT_DECIMALS};

/// Errors that can occur while parsing a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The amount string is empty.
    #[error("amount is empty")]
    Empty,

    /// The amount string contains something other than digits and a single decimal point.
    #[error("invalid amount: {0}")]
    Invalid(String),

    /// The amount has more fractional digits than a stroop can represent.
    #[error("amount has more than {TFT_DECIMALS} decimal places: {0}")]
    TooPrecise(String),

    /// The amount does not fit into a `u64` number of stroops.
    #[error("amount overflows: {0}")]
    Overflow(String),
}

/// Parses a decimal TFT amount such as `"100.0000000"` or `"0.5"` into stroops.
pub fn decimal_to_stroops(amount: &str) -> Result<u64, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (amount, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|f| !all_digits(f)) {
        return Err(AmountError::Invalid(amount.to_string()));
    }

    let fraction = fraction.unwrap_or_default();
    if fraction.len() > TFT_DECIMALS as usize {
        return Err(AmountError::TooPrecise(amount.to_string()));
    }

    let overflow = || AmountError::Overflow(amount.to_string());

    let whole: u64 = whole.parse().map_err(|_| overflow())?;
    let padded = format!("{fraction:0<width$}", width = TFT_DECIMALS as usize);
    let fraction: u64 = padded.parse().map_err(|_| overflow())?;

    whole
        .checked_mul(STROOPS_PER_TFT)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(overflow)
}

/// Renders stroops as a decimal TFT amount with exactly seven fractional digits.
pub fn stroops_to_decimal(stroops: u64) -> String {
    format!(
        "{}.{:0width$}",
        stroops / STROOPS_PER_TFT,
        stroops % STROOPS_PER_TFT,
        width = TFT_DECIMALS as usize
    )
}

/// Converts a whole number of TFT into stroops, returning `None` on overflow.
pub const fn tft_to_stroops(tft: u64) -> Option<u64> {
    tft.checked_mul(STROOPS_PER_TFT)
}
