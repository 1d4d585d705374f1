//! The cursor record and its file-backed store.

use std::{
    fs,
    io::{BufWriter, ErrorKind as IoErrorKind, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::errors::CursorResult;

/// Where the bridge resumes scanning after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursors {
    /// Last destination-chain block height whose events were handled.
    #[serde(default)]
    pub last_height: u64,

    /// Horizon paging token of the last handled vault transaction.
    #[serde(default)]
    pub stellar_cursor: String,
}

/// Single-writer store for [`Cursors`], rewritten atomically on every update.
#[derive(Debug)]
pub struct CursorStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles of the two cursors.
    write_lock: Mutex<()>,
}

impl CursorStore {
    /// Creates a store backed by the file at `path`. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the path of the cursor file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cursors, returning the default record when the file does not exist yet.
    pub fn load(&self) -> CursorResult<Cursors> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let cursors = serde_json::from_slice(&bytes)?;
                trace!(path = %self.path.display(), ?cursors, "loaded cursors");
                Ok(cursors)
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Cursors::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Records the last handled destination-chain height.
    pub fn save_height(&self, height: u64) -> CursorResult<()> {
        self.update(|cursors| cursors.last_height = height)
    }

    /// Records the last handled Horizon paging token.
    pub fn save_stellar_cursor(&self, cursor: &str) -> CursorResult<()> {
        self.update(|cursors| cursors.stellar_cursor = cursor.to_string())
    }

    /// Verifies that the cursor file can be written, creating it with the current content.
    ///
    /// Called once at start-up so that an unusable location aborts the process early.
    pub fn ensure_writable(&self) -> CursorResult<()> {
        self.update(|_| {})
    }

    fn update(&self, f: impl FnOnce(&mut Cursors)) -> CursorResult<()> {
        let _guard = self.write_lock.lock();
        let mut cursors = self.load()?;
        f(&mut cursors);
        self.write(&cursors)
    }

    fn write(&self, cursors: &Cursors) -> CursorResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, cursors)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), ?cursors, "persisted cursors");
        Ok(())
    }
}
