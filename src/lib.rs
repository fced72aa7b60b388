//! Transmission Splitter
//!
//! One-shot batch task that splits the source audio of a single transmission
//! into stems and uploads them back to object storage.
//!
//! # Architecture
//!
//! The pipeline consists of:
//!
//! - **Workspace**: per-job temporary directory tree, always removed at the end
//! - **I/O**: durable storage access using object_store (S3, offline S3, local)
//! - **Pipeline**: fetch, separate (external tool), collect, upload, sequenced
//!   by the orchestrator
//!
//! # Usage
//!
//! ```no_run
//! use transmission_splitter::{run_job, Config, JobId};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::from_file(&"config.yaml".into())?;
//!     config.storage.bucket = Some("dev-emptystream-mainBucket".to_string());
//!     run_job(&config, JobId::new("abc123")?).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod job;
pub mod pipeline;
pub mod workspace;

pub use config::Config;
pub use error::{PipelineError, TransferError};
pub use job::JobId;
pub use pipeline::{JobOutcome, JobReport, Orchestrator, Phase};
pub use workspace::Workspace;

use anyhow::Result;

/// Run one job with the given configuration.
pub async fn run_job(config: &Config, id: JobId) -> Result<JobReport> {
    config.validate()?;

    let store = io::create_store(&config.storage)?;
    let workspace = Workspace::new(&config.workspace.tmp_root);

    let outcome = Orchestrator::new(id, store, workspace, &config.tool).run().await;

    if config.processing.enable_metrics {
        outcome.metrics.log_summary();
        if let Some(ref path) = config.processing.metrics_output_path {
            if let Err(e) = outcome.metrics.save_to_file(path) {
                tracing::warn!("Failed to save metrics to {}: {}", path, e);
            }
        }
    }

    Ok(outcome.into_result()?)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
