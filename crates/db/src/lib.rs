//! Persistence of the bridge cursors.
//!
//! The bridge keeps no database of settlements: duplicates are suppressed by inspecting the
//! chains themselves. The only state persisted locally is where each scan should resume.

pub mod cursor;
pub mod errors;

pub use cursor::{CursorStore, Cursors};
