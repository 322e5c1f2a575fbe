mod job;
mod store;
mod worker;

pub use job::{GenerationJob, JobConfig, JobError, JobReport, JobStatus};
pub use store::{FileJobStore, JobStore, JobStoreError, StoreRetryPolicy};
pub use worker::Worker;
