//! Cursor store errors.

use tft_bridge_primitives::errors::ErrorKind;
use thiserror::Error;

/// Errors that can occur when reading or writing the cursor file.
#[derive(Debug, Error)]
pub enum CursorError {
    /// The cursor file or its directory cannot be accessed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The cursor file does not contain a valid cursor record.
    #[error("invalid cursor record: {0}")]
    InvalidData(#[from] serde_json::Error),

    /// The temporary file could not be moved over the cursor file.
    #[error("persist: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl CursorError {
    /// Returns the kind of this error.
    ///
    /// Write failures after start-up are logged and ignored by callers; the kind only matters for
    /// the start-up check where they are fatal.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}

/// Convenience alias for cursor store results.
pub type CursorResult<T> = Result<T, CursorError>;
