//! Command-line interface, built on clap.
//!
//! Subcommands: `submit` (enqueue a generation job), `status` (poll a job),
//! `work` (run the worker), `demo` (offline stub run against a sample file).

use clap::{Parser, Subcommand};

/// codeframe — resilient AI codeframe generation for survey responses.
#[derive(Debug, Parser)]
#[command(name = "codeframe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enqueue a generation job for a dataset of answers.
    Submit {
        /// Path to the answers file (JSON array of strings, or one per line).
        dataset: String,

        /// Number of clusters to group answers into.
        #[arg(long, default_value_t = 8)]
        clusters: u32,

        /// Maximum depth of the generated codeframe.
        #[arg(long, default_value_t = 2)]
        depth: u32,

        /// Language the codes are written in.
        #[arg(long, default_value = "English")]
        language: String,

        /// Ask for mutually exclusive, collectively exhaustive codes.
        #[arg(long, default_value_t = false)]
        mece: bool,
    },

    /// Show state, progress, cost and any partial results for a job.
    Status {
        /// Job id returned by `submit`.
        job_id: String,
    },

    /// Run the worker: process queued jobs until interrupted.
    Work {
        /// Exit once the queue is drained instead of polling forever.
        #[arg(long, default_value_t = false)]
        drain: bool,
    },

    /// Run one job against a local dataset without touching any API.
    Demo {
        /// Path to the answers file.
        dataset: String,
    },
}
