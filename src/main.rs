mod cli;
mod cluster;
mod config;
mod dataset;
mod embedding;
mod error;
mod hierarchy;
mod orchestrator;
mod protect;
mod queue;
mod ui;
mod upstream;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;

use cli::{Cli, Command};
use config::CodeframeConfig;
use embedding::{EmbeddingCache, select_store};
use error::CodeframeError;
use orchestrator::Orchestrator;
use protect::{CircuitBreaker, RateLimiter};
use queue::{FileJobStore, GenerationJob, JobConfig, JobStore, Worker};
use upstream::types::{ContentBlock, Usage};
use upstream::{
    AnthropicClient, Embedder, GenerateRequest, GenerateResponse, HttpEmbedder, Upstream,
    UpstreamError,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CodeframeConfig::load()?;

    if cli.verbose {
        eprintln!("model: {}", config.model);
        eprintln!("queue dir: {}", config.queue.dir);
        eprintln!("cache dir: {}", config.cache.dir);
    }

    match cli.command {
        Command::Submit {
            dataset,
            clusters,
            depth,
            language,
            mece,
        } => {
            let job_config = JobConfig {
                cluster_count: clusters,
                max_depth: depth,
                target_language: language,
                mece,
                ..JobConfig::default()
            };
            submit(&config, PathBuf::from(dataset), job_config).await
        }
        Command::Status { job_id } => status(&config, &job_id).await,
        Command::Work { drain } => work(&config, drain).await,
        Command::Demo { dataset } => demo(&config, PathBuf::from(dataset)).await,
    }
}

async fn submit(config: &CodeframeConfig, dataset: PathBuf, job_config: JobConfig) -> Result<()> {
    if !dataset.exists() {
        bail!("dataset file not found: {}", dataset.display());
    }
    let store = FileJobStore::new(&config.queue.dir)?;
    let job = GenerationJob::new(dataset, job_config);
    config.queue.reconnect.run(|| store.put(&job)).await;
    println!("{} {}", job.id, job.status);
    Ok(())
}

async fn status(config: &CodeframeConfig, job_id: &str) -> Result<()> {
    let store = FileJobStore::new(&config.queue.dir)?;
    let job = config
        .queue
        .reconnect
        .run(|| store.get(job_id))
        .await
        .ok_or_else(|| CodeframeError::JobNotFound(job_id.to_string()))?;
    ui::print_report(&job.report());
    Ok(())
}

async fn work(config: &CodeframeConfig, drain: bool) -> Result<()> {
    if config.api_key.is_empty() {
        return Err(CodeframeError::Config(
            "no API key: set ANTHROPIC_API_KEY or api_key in codeframe.toml".to_string(),
        )
        .into());
    }
    let upstream = Arc::new(AnthropicClient::new(config.api_key.clone()));
    let embedder = Arc::new(HttpEmbedder::new(
        config.embedding.api_key.clone(),
        config.embedding.base_url.clone(),
        config.embedding.model.clone(),
    ));
    run_worker(config, upstream, embedder, drain).await
}

async fn demo(config: &CodeframeConfig, dataset: PathBuf) -> Result<()> {
    let store = FileJobStore::new(&config.queue.dir)?;
    let mut job = GenerationJob::new(dataset, JobConfig::default());
    let progress = ui::JobProgress::start(&job.id);
    progress.update(&job.report());

    let cache = build_cache(config);
    let orchestrator = build_orchestrator(
        config,
        Arc::new(StubUpstream),
        Arc::new(StubEmbedder),
        cache.clone(),
    );
    orchestrator
        .run_job(&mut job, &store, &config.queue.reconnect)
        .await;

    let report = job.report();
    progress.finish(&report);
    ui::print_report(&report);
    println!("cache: {} hits, {} misses", cache.hits(), cache.misses());
    Ok(())
}

async fn run_worker<U: Upstream, E: Embedder>(
    config: &CodeframeConfig,
    upstream: Arc<U>,
    embedder: Arc<E>,
    drain: bool,
) -> Result<()> {
    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::new(&config.queue.dir)?);
    let cache = build_cache(config);
    let orchestrator = Arc::new(build_orchestrator(config, upstream, embedder, cache));
    let worker = Worker::new(
        orchestrator,
        store,
        config.queue.reconnect,
        config.worker.concurrency,
        config.poll_interval(),
    );

    if drain {
        let ran = worker.run_pending().await;
        println!("processed {ran} job(s)");
    } else {
        println!("worker running, ctrl-c to stop");
        worker.run_forever().await;
    }
    Ok(())
}

fn build_cache(config: &CodeframeConfig) -> Arc<EmbeddingCache> {
    let store = select_store(Path::new(&config.cache.dir));
    Arc::new(EmbeddingCache::new(store, config.cache_ttl()))
}

fn build_orchestrator<U: Upstream, E: Embedder>(
    config: &CodeframeConfig,
    upstream: Arc<U>,
    embedder: Arc<E>,
    cache: Arc<EmbeddingCache>,
) -> Orchestrator<U, E> {
    Orchestrator::new(
        upstream,
        embedder,
        cache,
        Arc::new(RateLimiter::new(
            config.limiter.max_calls,
            config.limiter_window(),
        )),
        Arc::new(CircuitBreaker::new(
            config.breaker.failure_threshold,
            config.breaker_cooldown(),
        )),
        config.retry,
        config.cost.prices.clone(),
        config.cost.ceiling_usd,
        config.worker.min_answers,
        config.model.clone(),
        config.max_tokens,
    )
}

/// Offline stand-ins for the demo command: no network, fixed output.
struct StubUpstream;

impl Upstream for StubUpstream {
    fn generate(
        &self,
        req: &GenerateRequest,
    ) -> impl Future<Output = Result<GenerateResponse, UpstreamError>> + Send {
        let resp = GenerateResponse {
            id: "demo".to_string(),
            content: vec![ContentBlock {
                content_type: "text".to_string(),
                text: r#"{"codes":[{"label":"Sample theme","description":"Generated offline by the demo stub"}]}"#
                    .to_string(),
            }],
            model: req.model.clone(),
            stop_reason: Some("end_turn".to_string()),
            usage: Usage {
                input_tokens: 0,
                output_tokens: 0,
            },
        };
        async move { Ok(resp) }
    }
}

struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, UpstreamError>> + Send {
        let v = vec![
            text.len() as f32,
            text.bytes().next().unwrap_or(0) as f32,
            text.split_whitespace().count() as f32,
        ];
        async move { Ok(v) }
    }

    fn model_version(&self) -> &str {
        "demo-embed"
    }
}
