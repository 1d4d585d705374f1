//! Crate includes reusable utils for services that handle common behavior.
//! Such as initializing the tracing framework and retrying settlements with a fixed back-off.

pub mod logging;
pub mod retry;

// Re-export tracing crate for convenience.
pub use tracing;
