use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCategory;
use crate::hierarchy::{ClusterCodes, CodeFrame};
use crate::orchestrator::Stage;
use crate::protect::CostLedger;

/// Tunables for one generation job, fixed at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Number of clusters the answers are grouped into.
    pub cluster_count: u32,
    /// Maximum depth of the generated codeframe.
    pub max_depth: u32,
    /// Language the codes are written in.
    pub target_language: String,
    /// Ask the model for mutually exclusive, collectively exhaustive codes.
    pub mece: bool,
    /// Per-level cap on generated codes.
    pub max_codes_per_level: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            cluster_count: 8,
            max_depth: 2,
            target_language: "English".to_string(),
            mece: false,
            max_codes_per_level: 10,
        }
    }
}

/// Lifecycle status of a job. Transitions are monotonic: a job never moves
/// back toward Queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Active => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Active => write!(f, "ACTIVE"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// What went wrong, in job-status terms: a short category, the stage it
/// happened in, and an actionable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub category: ErrorCategory,
    pub stage: Stage,
    pub message: String,
}

/// One codeframe generation request, owned by the queue and mutated only by
/// the worker. The payload carries everything a restarted worker needs to
/// resume: config, checkpointed cluster codes, and the accrued cost ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: String,
    pub dataset: PathBuf,
    pub config: JobConfig,
    pub status: JobStatus,
    pub stage: Stage,
    pub progress_pct: u8,
    pub checkpoint: Vec<ClusterCodes>,
    pub ledger: CostLedger,
    pub result: Option<CodeFrame>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(dataset: PathBuf, config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            dataset,
            config,
            status: JobStatus::Queued,
            stage: Stage::Validating,
            progress_pct: 0,
            checkpoint: Vec::new(),
            ledger: CostLedger::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move status forward. Regressions are refused so a stale writer can
    /// never un-complete a job.
    fn advance_status(&mut self, next: JobStatus) {
        if next.rank() >= self.status.rank() {
            self.status = next;
            self.touch();
        }
    }

    pub fn mark_active(&mut self) {
        self.advance_status(JobStatus::Active);
    }

    pub fn set_stage(&mut self, stage: Stage, progress_pct: u8) {
        self.stage = stage;
        self.progress_pct = progress_pct.min(100);
        self.touch();
    }

    pub fn set_progress(&mut self, progress_pct: u8) {
        self.progress_pct = progress_pct.min(100);
        self.touch();
    }

    /// Record one finished cluster. Replaces an existing entry for the same
    /// cluster index so a resumed run cannot duplicate codes.
    pub fn checkpoint_cluster(&mut self, codes: ClusterCodes) {
        self.checkpoint.retain(|c| c.cluster != codes.cluster);
        self.checkpoint.push(codes);
        self.touch();
    }

    pub fn has_checkpoint_for(&self, cluster: usize) -> bool {
        self.checkpoint.iter().any(|c| c.cluster == cluster)
    }

    pub fn complete(&mut self, frame: CodeFrame) {
        self.result = Some(frame);
        self.stage = Stage::Done;
        self.progress_pct = 100;
        self.advance_status(JobStatus::Completed);
    }

    pub fn fail(&mut self, category: ErrorCategory, stage: Stage, message: impl Into<String>) {
        self.error = Some(JobError {
            category,
            stage,
            message: message.into(),
        });
        self.stage = Stage::Failed;
        self.advance_status(JobStatus::Failed);
    }

    /// The status-contract view: state, progress, cost, partial results and
    /// error category if failed.
    pub fn report(&self) -> JobReport {
        let partial = match &self.result {
            Some(frame) => Some(frame.clone()),
            None if !self.checkpoint.is_empty() => {
                Some(CodeFrame::from_clusters(self.checkpoint.clone()))
            }
            None => None,
        };
        JobReport {
            id: self.id.clone(),
            status: self.status,
            stage: self.stage,
            progress_pct: self.progress_pct,
            cost_usd: self.ledger.total(),
            partial,
            error: self.error.clone(),
        }
    }
}

/// Answer to "what is job X doing?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub id: String,
    pub status: JobStatus,
    pub stage: Stage,
    pub progress_pct: u8,
    pub cost_usd: f64,
    pub partial: Option<CodeFrame>,
    pub error: Option<JobError>,
}
