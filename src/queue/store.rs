//! Durable job storage.
//!
//! One JSON file per job under a queue directory; payload and status survive
//! process restarts. Transient store failures are absorbed by
//! [`StoreRetryPolicy`]: callers block-and-retry with bounded backoff instead
//! of erroring, so a brief outage never drops or hides a durable job.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{GenerationJob, JobStatus};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job store IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("job store corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable store for jobs. Sync and dyn-safe; the worker holds an
/// `Arc<dyn JobStore>`.
pub trait JobStore: Send + Sync {
    fn put(&self, job: &GenerationJob) -> Result<(), JobStoreError>;
    fn get(&self, id: &str) -> Result<Option<GenerationJob>, JobStoreError>;
    fn list(&self) -> Result<Vec<GenerationJob>, JobStoreError>;

    /// Oldest queued job, if any.
    fn next_queued(&self) -> Result<Option<GenerationJob>, JobStoreError> {
        let mut queued: Vec<GenerationJob> = self
            .list()?
            .into_iter()
            .filter(|j| j.status == JobStatus::Queued)
            .collect();
        queued.sort_by_key(|j| j.created_at);
        Ok(queued.into_iter().next())
    }

    /// Jobs a killed worker left Active. They are resumable: their
    /// checkpoint says which clusters are already done.
    fn stale_active(&self) -> Result<Vec<GenerationJob>, JobStoreError> {
        let mut active: Vec<GenerationJob> = self
            .list()?
            .into_iter()
            .filter(|j| j.status == JobStatus::Active)
            .collect();
        active.sort_by_key(|j| j.created_at);
        Ok(active)
    }
}

/// File-backed store: `<dir>/<job-id>.json`, written atomically via a temp
/// file and rename. Completed and failed jobs are retained, never pruned.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl JobStore for FileJobStore {
    fn put(&self, job: &GenerationJob) -> Result<(), JobStoreError> {
        let path = self.path_for(&job.id);
        let tmp = self.dir.join(format!("{}.json.tmp", job.id));
        fs::write(&tmp, serde_json::to_string_pretty(job)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<GenerationJob>, JobStoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn list(&self) -> Result<Vec<GenerationJob>, JobStoreError> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                let contents = fs::read_to_string(&path)?;
                jobs.push(serde_json::from_str(&contents)?);
            }
        }
        jobs.sort_by_key(|j: &GenerationJob| j.created_at);
        Ok(jobs)
    }
}

/// Reconnect policy for store operations: unbounded attempts, exponentially
/// growing delay clamped to a ceiling. The explicit object makes "never drop
/// a durable job on a transient disconnect" a testable guarantee rather than
/// a magic flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreRetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl StoreRetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(2u64.pow(exp))
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Run a store operation, blocking-and-retrying until it succeeds.
    pub async fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, JobStoreError>,
    ) -> T {
        let mut attempt: u32 = 1;
        loop {
            match op() {
                Ok(value) => return value,
                Err(e) => {
                    eprintln!("  job store unavailable (attempt {attempt}): {e}, retrying");
                    tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf as StdPathBuf;
    use std::sync::Mutex;

    use tempfile::tempdir;

    use crate::queue::job::JobConfig;

    fn job() -> GenerationJob {
        GenerationJob::new(StdPathBuf::from("answers.json"), JobConfig::default())
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).unwrap();
        let job = job();
        store.put(&job).unwrap();

        let loaded = store.get(&job.id).unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, JobStatus::Queued);
        assert!(store.get("no-such-id").unwrap().is_none());
    }

    #[test]
    fn jobs_survive_store_reopen() {
        let dir = tempdir().unwrap();
        let (id_queued, id_done) = {
            let store = FileJobStore::new(dir.path()).unwrap();
            let queued = job();
            let mut done = job();
            done.mark_active();
            done.complete(crate::hierarchy::CodeFrame { codes: vec![] });
            store.put(&queued).unwrap();
            store.put(&done).unwrap();
            (queued.id, done.id)
        };

        // Restarted process: both payload and status are still there.
        let store = FileJobStore::new(dir.path()).unwrap();
        assert_eq!(
            store.get(&id_queued).unwrap().unwrap().status,
            JobStatus::Queued
        );
        assert_eq!(
            store.get(&id_done).unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn next_queued_is_oldest_first() {
        let dir = tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).unwrap();

        let mut first = job();
        first.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        let second = job();
        store.put(&second).unwrap();
        store.put(&first).unwrap();

        assert_eq!(store.next_queued().unwrap().unwrap().id, first.id);
    }

    #[test]
    fn completed_and_failed_jobs_are_retained() {
        let dir = tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).unwrap();

        let mut failed = job();
        failed.mark_active();
        failed.fail(
            crate::error::ErrorCategory::Validation,
            crate::orchestrator::Stage::Validating,
            "too few answers",
        );
        store.put(&failed).unwrap();

        // Still listed and queryable, but not runnable.
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.next_queued().unwrap().is_none());
        assert!(store.stale_active().unwrap().is_empty());
        let report = store.get(&failed.id).unwrap().unwrap().report();
        assert_eq!(
            report.error.unwrap().category,
            crate::error::ErrorCategory::Validation
        );
    }

    #[test]
    fn stale_active_finds_interrupted_jobs() {
        let dir = tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).unwrap();

        let mut interrupted = job();
        interrupted.mark_active();
        store.put(&interrupted).unwrap();
        store.put(&job()).unwrap();

        let stale = store.stale_active().unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, interrupted.id);
    }

    /// Store that fails its first N calls, simulating a transient outage.
    struct FlakyStore {
        inner: FileJobStore,
        failures_left: Mutex<u32>,
    }

    impl FlakyStore {
        fn failing(inner: FileJobStore, failures: u32) -> Self {
            Self {
                inner,
                failures_left: Mutex::new(failures),
            }
        }

        fn maybe_fail(&self) -> Result<(), JobStoreError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(JobStoreError::Io(std::io::Error::other(
                    "connection refused",
                )));
            }
            Ok(())
        }
    }

    impl JobStore for FlakyStore {
        fn put(&self, job: &GenerationJob) -> Result<(), JobStoreError> {
            self.maybe_fail()?;
            self.inner.put(job)
        }
        fn get(&self, id: &str) -> Result<Option<GenerationJob>, JobStoreError> {
            self.maybe_fail()?;
            self.inner.get(id)
        }
        fn list(&self) -> Result<Vec<GenerationJob>, JobStoreError> {
            self.maybe_fail()?;
            self.inner.list()
        }
    }

    #[tokio::test]
    async fn retry_policy_blocks_through_outage() {
        let dir = tempdir().unwrap();
        let store = FlakyStore::failing(FileJobStore::new(dir.path()).unwrap(), 3);
        let policy = StoreRetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 4,
        };

        let submitted = job();
        policy.run(|| store.put(&submitted)).await;

        // The job landed despite three consecutive failures.
        let loaded = policy.run(|| store.get(&submitted.id)).await;
        assert_eq!(loaded.unwrap().id, submitted.id);
    }

    #[test]
    fn retry_backoff_grows_and_clamps() {
        let policy = StoreRetryPolicy {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_millis(10_000));
    }
}
