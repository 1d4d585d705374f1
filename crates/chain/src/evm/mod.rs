//! EVM variant: withdraw events come from the token contract and mints carry one signed hash per
//! contract signer.

mod chain;
pub mod contract;
pub mod signing;

pub use chain::EvmChain;
