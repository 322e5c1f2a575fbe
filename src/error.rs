use thiserror::Error;

use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum CodeframeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Upstream API error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Short error category surfaced on a failed job's status.
///
/// This is the only error shape that crosses the job-status boundary;
/// raw transport errors never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Input rejected before any external call (e.g. too few answers).
    Validation,
    /// The shared rate budget stayed exhausted for too long.
    RateLimited,
    /// The circuit breaker is open; upstream is considered unhealthy.
    BreakerOpen,
    /// Transient upstream failures outlived the retry budget.
    RetryExhausted,
    /// The per-job cost ceiling was reached.
    CostExceeded,
    /// Anything else (auth, malformed responses).
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::RateLimited => write!(f, "rate_limited"),
            ErrorCategory::BreakerOpen => write!(f, "breaker_open"),
            ErrorCategory::RetryExhausted => write!(f, "retry_exhausted"),
            ErrorCategory::CostExceeded => write!(f, "cost_exceeded"),
            ErrorCategory::Other => write!(f, "other"),
        }
    }
}
