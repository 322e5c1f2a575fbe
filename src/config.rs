//! Configuration loaded from `codeframe.toml`.
//!
//! Every knob has a safe default, so an empty or missing file yields a
//! working setup. The `ANTHROPIC_API_KEY` and `EMBEDDINGS_API_KEY`
//! environment variables take precedence over the file.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::protect::{PriceTable, RetryPolicy};
use crate::queue::StoreRetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct CodeframeConfig {
    /// Anthropic API key for hierarchy generation.
    #[serde(default)]
    pub api_key: String,

    /// Generation model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Token cap per generation call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub cost: CostConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimiterConfig {
    /// Maximum calls admitted per trailing window.
    #[serde(default = "default_limiter_calls")]
    pub max_calls: u32,
    #[serde(default = "default_limiter_window_secs")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_breaker_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    /// Hard per-job spending limit in USD.
    #[serde(default = "default_ceiling_usd")]
    pub ceiling_usd: f64,
    #[serde(default)]
    pub prices: PriceTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_dir")]
    pub dir: String,
    #[serde(default)]
    pub reconnect: StoreRetryPolicy,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Jobs with fewer answers than this fail validation immediately.
    #[serde(default = "default_min_answers")]
    pub min_answers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_embedding_url() -> String {
    "https://api.voyageai.com/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "voyage-3.5".to_string()
}

fn default_limiter_calls() -> u32 {
    10
}

fn default_limiter_window_secs() -> u64 {
    60
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_secs() -> u64 {
    60
}

fn default_ceiling_usd() -> f64 {
    5.0
}

fn default_cache_dir() -> String {
    ".codeframe/cache".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_queue_dir() -> String {
    ".codeframe/jobs".to_string()
}

fn default_concurrency() -> usize {
    2
}

fn default_min_answers() -> usize {
    50
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_embedding_url(),
            model: default_embedding_model(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: default_limiter_calls(),
            window_secs: default_limiter_window_secs(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_breaker_threshold(),
            cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            ceiling_usd: default_ceiling_usd(),
            prices: PriceTable::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: default_queue_dir(),
            reconnect: StoreRetryPolicy::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            min_answers: default_min_answers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for CodeframeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            embedding: EmbeddingConfig::default(),
            limiter: LimiterConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            cost: CostConfig::default(),
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl CodeframeConfig {
    /// Load from `codeframe.toml` in the current directory, falling back to
    /// defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("codeframe.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<CodeframeConfig>(&contents)?
        } else {
            Self::default()
        };

        // Environment takes precedence over the file for credentials.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }
        if let Ok(key) = std::env::var("EMBEDDINGS_API_KEY")
            && !key.is_empty()
        {
            config.embedding.api_key = key;
        }

        Ok(config)
    }

    pub fn limiter_window(&self) -> Duration {
        Duration::from_secs(self.limiter.window_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker.cooldown_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }
}
