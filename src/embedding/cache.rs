//! Content-addressed, TTL-bounded embedding cache.
//!
//! A hit within TTL returns the stored vector with zero external calls.
//! A read past TTL is treated identically to a miss. Store failures degrade
//! to compute-through: the cache is never a hard dependency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;

use super::key::cache_key;
use super::store::{CachedVector, VectorStore};

pub struct EmbeddingCache {
    store: Box<dyn VectorStore>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(store: Box<dyn VectorStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached vector for (text, model version), or invoke
    /// `compute` and store the result. `compute` runs exactly once per
    /// distinct normalized input while the entry stays fresh.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        text: &str,
        model_version: &str,
        compute: F,
    ) -> Result<Vec<f32>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<f32>, E>>,
    {
        let key = cache_key(text, model_version);

        // A store read error is a miss, not a failure.
        if let Ok(Some(entry)) = self.store.get(&key)
            && self.is_fresh(&entry)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.vector);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = compute().await?;

        // Values are content-addressed and idempotent; a lost write just
        // means a recompute later, so the result is ignored.
        let _ = self.store.put(
            &key,
            &CachedVector {
                vector: vector.clone(),
                model_version: model_version.to_string(),
                stored_at: Utc::now(),
            },
        );

        Ok(vector)
    }

    fn is_fresh(&self, entry: &CachedVector) -> bool {
        let age = Utc::now().signed_duration_since(entry.stored_at);
        age.to_std().is_ok_and(|age| age <= self.ttl)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use tempfile::tempdir;

    use crate::embedding::store::{FileVectorStore, NoopVectorStore, StoreError};

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    async fn compute_counted(counter: &AtomicU32) -> Result<Vec<f32>, std::convert::Infallible> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 2.0, 3.0])
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let dir = tempdir().unwrap();
        let cache = EmbeddingCache::new(
            Box::new(FileVectorStore::new(dir.path()).unwrap()),
            WEEK,
        );
        let computes = AtomicU32::new(0);

        let v1 = cache
            .get_or_compute("Great service", "embed-v2", || compute_counted(&computes))
            .await
            .unwrap();
        let v2 = cache
            .get_or_compute("  great   service ", "embed-v2", || {
                compute_counted(&computes)
            })
            .await
            .unwrap();

        assert_eq!(v1, v2);
        assert_eq!(computes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[tokio::test]
    async fn different_model_version_recomputes() {
        let dir = tempdir().unwrap();
        let cache = EmbeddingCache::new(
            Box::new(FileVectorStore::new(dir.path()).unwrap()),
            WEEK,
        );
        let computes = AtomicU32::new(0);

        cache
            .get_or_compute("great service", "embed-v1", || compute_counted(&computes))
            .await
            .unwrap();
        cache
            .get_or_compute("great service", "embed-v2", || compute_counted(&computes))
            .await
            .unwrap();

        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_behaves_as_miss() {
        let dir = tempdir().unwrap();
        let store = FileVectorStore::new(dir.path()).unwrap();

        // Plant an entry that is physically present but logically expired.
        let key = cache_key("old answer", "embed-v2");
        store
            .put(
                &key,
                &CachedVector {
                    vector: vec![9.0],
                    model_version: "embed-v2".into(),
                    stored_at: Utc::now() - chrono::Duration::days(8),
                },
            )
            .unwrap();

        let cache = EmbeddingCache::new(Box::new(store), WEEK);
        let computes = AtomicU32::new(0);
        let v = cache
            .get_or_compute("old answer", "embed-v2", || compute_counted(&computes))
            .await
            .unwrap();

        assert_eq!(v, vec![1.0, 2.0, 3.0]);
        assert_eq!(computes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[tokio::test]
    async fn noop_store_always_computes() {
        let cache = EmbeddingCache::new(Box::new(NoopVectorStore), WEEK);
        let computes = AtomicU32::new(0);

        for _ in 0..3 {
            cache
                .get_or_compute("same text", "embed-v2", || compute_counted(&computes))
                .await
                .unwrap();
        }
        assert_eq!(computes.load(Ordering::SeqCst), 3);
        assert_eq!(cache.misses(), 3);
    }

    /// Store whose reads and writes always fail, simulating an unreachable
    /// backend that appeared healthy at startup.
    struct BrokenStore;

    impl VectorStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<CachedVector>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("connection reset")))
        }
        fn put(&self, _key: &str, _entry: &CachedVector) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("connection reset")))
        }
    }

    #[tokio::test]
    async fn broken_store_degrades_to_compute_through() {
        let cache = EmbeddingCache::new(Box::new(BrokenStore), WEEK);
        let computes = AtomicU32::new(0);

        let v = cache
            .get_or_compute("answer", "embed-v2", || compute_counted(&computes))
            .await
            .unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compute_error_propagates() {
        let dir = tempdir().unwrap();
        let cache = EmbeddingCache::new(
            Box::new(FileVectorStore::new(dir.path()).unwrap()),
            WEEK,
        );

        let result = cache
            .get_or_compute("answer", "embed-v2", || async {
                Err::<Vec<f32>, &str>("embedder down")
            })
            .await;
        assert_eq!(result.unwrap_err(), "embedder down");
    }
}
