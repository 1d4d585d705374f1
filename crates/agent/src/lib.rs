//! The two roles a bridge node can play.
//!
//! The [`Leader`] watches the vault and the destination chain and proposes every settlement; a
//! [`Follower`] validates what the leader proposes against both chains before signing it.

pub mod collector;
pub mod errors;
pub mod follower;
pub mod leader;

pub use collector::FanoutCollector;
pub use errors::{AgentError, AgentResult};
pub use follower::Follower;
pub use leader::{Leader, LeaderConfig};

#[cfg(test)]
mod tests;
