//! Per-job workflow state machine.
//!
//! Each job walks VALIDATING → EMBEDDING → CLUSTERING →
//! GENERATING_HIERARCHY → PERSISTING → DONE, strictly in sequence; FAILED is
//! reachable from every stage and carries the classified error plus the
//! stage it occurred in. Progress and per-cluster results are checkpointed
//! to the job store so a restarted worker resumes instead of starting over.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::cluster::kmeans;
use crate::dataset::load_answers;
use crate::embedding::EmbeddingCache;
use crate::error::ErrorCategory;
use crate::hierarchy::{ClusterCodes, CodeFrame, cluster_prompt, parse_cluster_codes};
use crate::protect::{
    CircuitBreaker, CostGuard, GenerateError, PriceTable, ProtectedClient, RateLimiter,
    RetryPolicy,
};
use crate::queue::{GenerationJob, JobStore, StoreRetryPolicy};
use crate::upstream::{Embedder, GenerateRequest, Upstream, UpstreamError};

/// Pipeline stage of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Validating,
    Embedding,
    Clustering,
    GeneratingHierarchy,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validating => write!(f, "VALIDATING"),
            Stage::Embedding => write!(f, "EMBEDDING"),
            Stage::Clustering => write!(f, "CLUSTERING"),
            Stage::GeneratingHierarchy => write!(f, "GENERATING_HIERARCHY"),
            Stage::Persisting => write!(f, "PERSISTING"),
            Stage::Done => write!(f, "DONE"),
            Stage::Failed => write!(f, "FAILED"),
        }
    }
}

/// A stage error in job-status terms.
struct StageFailure {
    category: ErrorCategory,
    stage: Stage,
    message: String,
}

impl StageFailure {
    fn new(category: ErrorCategory, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            category,
            stage,
            message: message.into(),
        }
    }
}

/// Drives jobs through the full pipeline. One instance is shared by all
/// worker tasks; the limiter and breaker inside it are the process-wide
/// protected-call state.
pub struct Orchestrator<U: Upstream, E: Embedder> {
    upstream: Arc<U>,
    embedder: Arc<E>,
    cache: Arc<EmbeddingCache>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    prices: PriceTable,
    ceiling_usd: f64,
    min_answers: usize,
    model: String,
    max_tokens: u32,
}

impl<U: Upstream, E: Embedder> Orchestrator<U, E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        upstream: Arc<U>,
        embedder: Arc<E>,
        cache: Arc<EmbeddingCache>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        prices: PriceTable,
        ceiling_usd: f64,
        min_answers: usize,
        model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            upstream,
            embedder,
            cache,
            limiter,
            breaker,
            retry,
            prices,
            ceiling_usd,
            min_answers,
            model,
            max_tokens,
        }
    }

    /// Run one job to COMPLETED or FAILED, checkpointing along the way.
    /// Store writes go through the reconnect policy, so they block-and-retry
    /// through a transient outage instead of erroring.
    pub async fn run_job(
        &self,
        job: &mut GenerationJob,
        store: &dyn JobStore,
        store_retry: &StoreRetryPolicy,
    ) {
        job.mark_active();
        store_retry.run(|| store.put(job)).await;

        match self.execute(job, store, store_retry).await {
            Ok(frame) => job.complete(frame),
            Err(failure) => {
                eprintln!(
                    "  job {} failed in {}: {}",
                    job.id, failure.stage, failure.message
                );
                job.fail(failure.category, failure.stage, failure.message);
            }
        }
        store_retry.run(|| store.put(job)).await;
    }

    async fn execute(
        &self,
        job: &mut GenerationJob,
        store: &dyn JobStore,
        store_retry: &StoreRetryPolicy,
    ) -> Result<CodeFrame, StageFailure> {
        // VALIDATING: reject undersized input with zero external calls.
        job.set_stage(Stage::Validating, 5);
        store_retry.run(|| store.put(job)).await;

        let answers = load_answers(&job.dataset).map_err(|e| {
            StageFailure::new(ErrorCategory::Validation, Stage::Validating, e.to_string())
        })?;
        if answers.len() < self.min_answers {
            return Err(StageFailure::new(
                ErrorCategory::Validation,
                Stage::Validating,
                format!(
                    "need at least {} answers, got {}",
                    self.min_answers,
                    answers.len()
                ),
            ));
        }

        // EMBEDDING: one vector per answer, cache-first.
        job.set_stage(Stage::Embedding, 10);
        store_retry.run(|| store.put(job)).await;

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(answers.len());
        for (i, answer) in answers.iter().enumerate() {
            let vector = self
                .cache
                .get_or_compute(answer, self.embedder.model_version(), || {
                    self.embedder.embed(answer)
                })
                .await
                .map_err(|e| {
                    StageFailure::new(embed_category(&e), Stage::Embedding, e.to_string())
                })?;
            vectors.push(vector);
            if i % 16 == 15 {
                job.set_progress(10 + (30 * i / answers.len()) as u8);
            }
        }

        // CLUSTERING: group vectors into the configured cluster count.
        job.set_stage(Stage::Clustering, 45);
        store_retry.run(|| store.put(job)).await;

        let assignments = kmeans(&vectors, job.config.cluster_count as usize);
        let cluster_count = assignments.iter().copied().max().map_or(0, |m| m + 1);
        let clusters: Vec<Vec<&str>> = (0..cluster_count)
            .map(|c| {
                answers
                    .iter()
                    .zip(&assignments)
                    .filter(|(_, a)| **a == c)
                    .map(|(text, _)| text.as_str())
                    .collect()
            })
            .collect();

        // GENERATING_HIERARCHY: one protected call per non-empty cluster,
        // checkpointed so a resumed job skips finished clusters.
        job.set_stage(Stage::GeneratingHierarchy, 50);
        store_retry.run(|| store.put(job)).await;

        let protected = ProtectedClient::new(
            self.upstream.clone(),
            self.limiter.clone(),
            self.breaker.clone(),
            self.retry,
            CostGuard::with_ledger(self.prices.clone(), self.ceiling_usd, job.ledger),
        );

        let total = clusters.iter().filter(|c| !c.is_empty()).count().max(1);
        let mut done = 0usize;
        for (cluster_idx, cluster_answers) in clusters.iter().enumerate() {
            if cluster_answers.is_empty() {
                continue;
            }
            if job.has_checkpoint_for(cluster_idx) {
                done += 1;
                continue;
            }

            let prompt = cluster_prompt(cluster_answers, &job.config);
            let req = GenerateRequest::user(&self.model, self.max_tokens, prompt);
            let resp = self.generate_with_backoff(&protected, &req).await?;
            job.ledger = protected.ledger();

            let codes = parse_cluster_codes(&resp.text(), &job.config).map_err(|e| {
                StageFailure::new(
                    ErrorCategory::Other,
                    Stage::GeneratingHierarchy,
                    e.to_string(),
                )
            })?;
            job.checkpoint_cluster(ClusterCodes {
                cluster: cluster_idx,
                answer_count: cluster_answers.len(),
                codes,
            });
            done += 1;
            job.set_progress(50 + (45 * done / total) as u8);
            store_retry.run(|| store.put(job)).await;
        }
        job.ledger = protected.ledger();

        // PERSISTING: assemble the final tree from the checkpoint.
        job.set_stage(Stage::Persisting, 95);
        store_retry.run(|| store.put(job)).await;
        Ok(CodeFrame::from_clusters(job.checkpoint.clone()))
    }

    /// Issue one protected call, absorbing the two back-off-and-retry
    /// classifications: a limiter denial waits its suggested share of the
    /// window (bounded to roughly two windows total), and an open breaker is
    /// waited out once for a full cooldown. Everything else fails the stage.
    async fn generate_with_backoff(
        &self,
        protected: &ProtectedClient<U>,
        req: &GenerateRequest,
    ) -> Result<crate::upstream::GenerateResponse, StageFailure> {
        let max_limiter_waits = 2 * self.limiter.max_calls();
        let mut limiter_waits = 0u32;
        let mut breaker_waited = false;
        loop {
            match protected.generate(req).await {
                Ok(resp) => return Ok(resp),
                Err(GenerateError::RateLimited) => {
                    limiter_waits += 1;
                    if limiter_waits > max_limiter_waits {
                        return Err(StageFailure::new(
                            ErrorCategory::RateLimited,
                            Stage::GeneratingHierarchy,
                            "rate budget stayed exhausted; resubmit later",
                        ));
                    }
                    sleep(protected.limiter_backoff()).await;
                }
                Err(GenerateError::BreakerOpen) if !breaker_waited => {
                    breaker_waited = true;
                    sleep(protected.breaker_cooldown()).await;
                }
                Err(e) => {
                    return Err(StageFailure::new(
                        e.category(),
                        Stage::GeneratingHierarchy,
                        e.to_string(),
                    ));
                }
            }
        }
    }
}

fn embed_category(e: &UpstreamError) -> ErrorCategory {
    match e {
        UpstreamError::RateLimited { .. } => ErrorCategory::RateLimited,
        _ => ErrorCategory::Other,
    }
}
