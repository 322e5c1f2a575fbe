//! Pulls queued jobs and runs them through the orchestrator with bounded
//! concurrency. On startup the worker first adopts jobs a killed process
//! left Active; their checkpoints make the resume cheap.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::orchestrator::Orchestrator;
use crate::upstream::{Embedder, Upstream};

use super::job::GenerationJob;
use super::store::{JobStore, StoreRetryPolicy};

pub struct Worker<U: Upstream, E: Embedder> {
    orchestrator: Arc<Orchestrator<U, E>>,
    store: Arc<dyn JobStore>,
    store_retry: StoreRetryPolicy,
    concurrency: usize,
    poll_interval: Duration,
}

impl<U: Upstream, E: Embedder> Worker<U, E> {
    pub fn new(
        orchestrator: Arc<Orchestrator<U, E>>,
        store: Arc<dyn JobStore>,
        store_retry: StoreRetryPolicy,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            store,
            store_retry,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Process everything currently runnable — stale Active jobs first, then
    /// the queue, oldest first — and return how many jobs were run.
    pub async fn run_pending(&self) -> usize {
        let mut set: JoinSet<()> = JoinSet::new();
        let mut ran = 0usize;

        let stale = self.store_retry.run(|| self.store.stale_active()).await;
        for job in stale {
            eprintln!("  resuming interrupted job {}", job.id);
            self.spawn_job(&mut set, job).await;
            ran += 1;
        }

        loop {
            let next = self.store_retry.run(|| self.store.next_queued()).await;
            let Some(mut job) = next else { break };
            // Claim before spawning so the next poll cannot pick it again.
            job.mark_active();
            self.store_retry.run(|| self.store.put(&job)).await;
            self.spawn_job(&mut set, job).await;
            ran += 1;
        }

        while set.join_next().await.is_some() {}
        ran
    }

    /// Poll forever, sleeping between empty rounds.
    pub async fn run_forever(&self) {
        loop {
            if self.run_pending().await == 0 {
                sleep(self.poll_interval).await;
            }
        }
    }

    async fn spawn_job(&self, set: &mut JoinSet<()>, mut job: GenerationJob) {
        // Bound the pool before adding one more task.
        while set.len() >= self.concurrency {
            set.join_next().await;
        }
        let orchestrator = self.orchestrator.clone();
        let store = self.store.clone();
        let store_retry = self.store_retry;
        set.spawn(async move {
            orchestrator.run_job(&mut job, &*store, &store_retry).await;
        });
    }
}
