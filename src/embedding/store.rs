//! Backing stores for cached embedding vectors.
//!
//! Two implementations behind one trait: a file-backed store (one JSON file
//! per content hash) and a no-op pass-through used when the backing store is
//! unreachable. The choice is made once at startup, not per call.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache store corrupt entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One cached vector with the metadata the TTL check needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVector {
    pub vector: Vec<f32>,
    pub model_version: String,
    pub stored_at: DateTime<Utc>,
}

/// Key/value store for vectors. Sync and dyn-safe so call sites hold a
/// `Box<dyn VectorStore>` chosen at startup.
pub trait VectorStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedVector>, StoreError>;
    fn put(&self, key: &str, entry: &CachedVector) -> Result<(), StoreError>;
}

/// File-backed store: `<dir>/<hash>.json` per entry. Writes go through a
/// temp file and rename so a crash never leaves a half-written entry.
pub struct FileVectorStore {
    dir: PathBuf,
}

impl FileVectorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Startup probe: the store is usable when its directory can be created
    /// and written to.
    pub fn probe(dir: &Path) -> bool {
        if fs::create_dir_all(dir).is_err() {
            return false;
        }
        let probe = dir.join(".probe");
        let ok = fs::write(&probe, b"ok").is_ok();
        let _ = fs::remove_file(&probe);
        ok
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl VectorStore for FileVectorStore {
    fn get(&self, key: &str) -> Result<Option<CachedVector>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        let entry = serde_json::from_str(&contents)?;
        Ok(Some(entry))
    }

    fn put(&self, key: &str, entry: &CachedVector) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, serde_json::to_string(entry)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Pass-through store: every read misses, every write is discarded. Selected
/// when the real store is unreachable so caching degrades to a no-op instead
/// of becoming a hard dependency.
pub struct NoopVectorStore;

impl VectorStore for NoopVectorStore {
    fn get(&self, _key: &str) -> Result<Option<CachedVector>, StoreError> {
        Ok(None)
    }

    fn put(&self, _key: &str, _entry: &CachedVector) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Pick the store implementation once at startup.
pub fn select_store(dir: &Path) -> Box<dyn VectorStore> {
    if FileVectorStore::probe(dir)
        && let Ok(store) = FileVectorStore::new(dir)
    {
        return Box::new(store);
    }
    eprintln!(
        "warning: embedding cache at {} unreachable, running without cache",
        dir.display()
    );
    Box::new(NoopVectorStore)
}
