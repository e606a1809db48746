//! Key-value persistence backends with a hard byte capacity.
//!
//! The capacity stands in for the browser storage quota the product runs
//! against: writes that would push the backend past its limit fail with
//! [`BackendError::QuotaExceeded`], which the adapter layer recovers from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

/// Default capacity, mirroring a typical per-origin browser quota.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Errors from the raw key-value layer.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The write would exceed the backend's byte capacity.
    #[error("Storage quota exceeded: {attempted} bytes against a {quota}-byte quota")]
    QuotaExceeded { attempted: u64, quota: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract key-value persistence layer.
///
/// `write` replaces any existing value under the key. `remove` of an absent
/// key is a no-op. `clear` empties the whole key space -- the adapter's last
/// resort under quota pressure.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
    async fn write(&self, key: &str, value: &[u8]) -> Result<(), BackendError>;
    async fn remove(&self, key: &str) -> Result<(), BackendError>;
    async fn clear(&self) -> Result<(), BackendError>;
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-memory backend, used by tests and as the reference implementation of
/// the quota accounting.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    quota_bytes: u64,
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            quota_bytes,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        let mut entries = self.entries.lock().await;
        let current: u64 = entries.values().map(|v| v.len() as u64).sum();
        let existing = entries.get(key).map(|v| v.len() as u64).unwrap_or(0);
        let attempted = current - existing + value.len() as u64;
        if attempted > self.quota_bytes {
            return Err(BackendError::QuotaExceeded {
                attempted,
                quota: self.quota_bytes,
            });
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileBackend
// ---------------------------------------------------------------------------

/// File-backed backend: one file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    quota_bytes: u64,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes,
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    async fn ensure_dir(&self) -> Result<(), BackendError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
        }
        Ok(())
    }

    /// Total bytes stored under the data directory, excluding `skip`.
    async fn stored_bytes_excluding(&self, skip: &Path) -> Result<u64, BackendError> {
        let mut total = 0u64;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path() == skip {
                continue;
            }
            total += entry.metadata().await?.len();
        }
        Ok(total)
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        match fs::read(self.key_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        self.ensure_dir().await?;
        let path = self.key_path(key);
        let others = self.stored_bytes_excluding(&path).await?;
        let attempted = others + value.len() as u64;
        if attempted > self.quota_bytes {
            return Err(BackendError::QuotaExceeded {
                attempted,
                quota: self.quota_bytes,
            });
        }
        fs::write(&path, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        match fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<(), BackendError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            fs::remove_file(entry.path()).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
