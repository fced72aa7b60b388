//! Sequence the stages of one job and guarantee workspace cleanup.
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Separating ─▶ Collecting ─▶ Uploading ─▶ Cleanup ─▶ Done
//!   │         │            │             │             │
//!   └─────────┴────────────┴─────────────┴─────────────┴──▶ Cleanup (on failure)
//! ```
//!
//! `Cleanup` is entered exactly once per job, after every other stage has
//! completed or failed. The first stage error is returned unchanged after
//! cleanup; cleanup failures are only logged.

use crate::config::ToolConfig;
use crate::error::Result;
use crate::job::JobId;
use crate::pipeline::{
    ChannelUploader, Metrics, MetricsSnapshot, Separator, SourceFetcher, Stage, StemCollector,
};
use crate::workspace::Workspace;
use futures::FutureExt;
use object_store::ObjectStore;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// States of the job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Separating,
    Collecting,
    Uploading,
    Cleanup,
    Done,
}

/// Result of a successful job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: JobId,
    /// Names of the uploaded stems
    pub stems: Vec<String>,
}

/// Everything observable after a job has run, successful or not.
#[derive(Debug)]
pub struct JobOutcome {
    /// Phases entered, in order
    pub phases: Vec<Phase>,
    pub metrics: MetricsSnapshot,
    pub result: Result<JobReport>,
}

impl JobOutcome {
    pub fn into_result(self) -> Result<JobReport> {
        self.result
    }
}

/// Runs one job end to end. Consumed by [`Orchestrator::run`], so a job can
/// only be run once.
pub struct Orchestrator {
    id: JobId,
    workspace: Workspace,
    fetcher: SourceFetcher,
    separator: Separator,
    collector: StemCollector,
    uploader: ChannelUploader,
    metrics: Arc<Metrics>,
    phases: Vec<Phase>,
}

impl Orchestrator {
    pub fn new(id: JobId, store: Arc<dyn ObjectStore>, workspace: Workspace, tool: &ToolConfig) -> Self {
        let metrics = Metrics::new();
        Self {
            fetcher: SourceFetcher::new(store.clone(), workspace.clone(), metrics.clone()),
            separator: Separator::from_config(tool),
            collector: StemCollector::new(tool.output_root(), workspace.clone(), metrics.clone()),
            uploader: ChannelUploader::new(store, workspace.clone(), metrics.clone()),
            id,
            workspace,
            metrics,
            phases: vec![Phase::Idle],
        }
    }

    /// Run every stage, then clean up.
    ///
    /// A panic in a stage still runs cleanup before the panic is resumed.
    pub async fn run(mut self) -> JobOutcome {
        tracing::info!(job_id = %self.id, "Starting job");

        let outcome = AssertUnwindSafe(self.run_stages()).catch_unwind().await;

        self.cleanup().await;

        let result = match outcome {
            Ok(Ok(stems)) => {
                self.enter(Phase::Done);
                tracing::info!(job_id = %self.id, "Job complete");
                Ok(JobReport { id: self.id.clone(), stems })
            }
            Ok(Err(e)) => {
                tracing::error!(job_id = %self.id, "Job failed: {}", e);
                Err(e)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        };

        JobOutcome {
            phases: self.phases,
            metrics: self.metrics.snapshot(),
            result,
        }
    }

    async fn run_stages(&mut self) -> Result<Vec<String>> {
        self.enter(Phase::Fetching);
        let asset = timed(&self.metrics, Stage::Fetch, self.fetcher.fetch(&self.id)).await?;

        self.enter(Phase::Separating);
        timed(&self.metrics, Stage::Separate, self.separator.separate(&asset.path)).await?;

        self.enter(Phase::Collecting);
        timed(&self.metrics, Stage::Collect, self.collector.collect(&self.id)).await?;

        self.enter(Phase::Uploading);
        timed(&self.metrics, Stage::Upload, self.uploader.upload_all(&self.id)).await
    }

    /// Remove the workspace and any tool output left by a failed run.
    async fn cleanup(&mut self) {
        self.enter(Phase::Cleanup);
        self.collector.discard_tool_output(&self.id).await;
        match self.workspace.teardown(&self.id).await {
            Ok(()) => tracing::debug!(job_id = %self.id, "Removed workspace"),
            Err(e) => tracing::warn!(
                job_id = %self.id,
                "Failed to remove workspace {}: {}",
                self.workspace.root(&self.id).display(),
                e
            ),
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(job_id = %self.id, ?phase, "Entering phase");
        self.phases.push(phase);
    }
}

async fn timed<T>(metrics: &Metrics, stage: Stage, fut: impl Future<Output = T>) -> T {
    let start = Instant::now();
    let output = fut.await;
    metrics.add_stage_time(stage, start.elapsed());
    output
}
