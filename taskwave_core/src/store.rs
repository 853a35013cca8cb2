//! Blob-store persistence seam.
//!
//! The engine persists templates and the history log as opaque byte
//! blobs keyed by name. Backends only need `load`/`save`; the schema of
//! the blobs is the engine's business.

use crate::error::{CoreError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key-value blob store consumed by the orchestrator.
pub trait BlobStore: Send + Sync {
    /// Loads the blob stored under `key`, or `None` if absent.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, replacing any previous value.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// File-backed store writing one `{key}.json` file per key under a
/// root directory. Keys are restricted to a safe character set so a
/// key can never escape the root.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl BlobStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::StoreIo(e)),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        // Write-then-rename so a crash mid-write leaves the old blob intact
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
