//! This crate contains general types, constants and pure functions that are shared across the
//! bridge crates.
//!
//! It lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod amount;
pub mod constants;
pub mod errors;
pub mod memo;
pub mod network;
pub mod types;
