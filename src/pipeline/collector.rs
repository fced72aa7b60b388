//! Move the separation tool's stems into the job workspace.

use crate::error::{PipelineError, Result, TransferError, TransferFailure, TransferStage};
use crate::job::JobId;
use crate::pipeline::Metrics;
use crate::workspace::{ensure, remove_dir_if_exists, Workspace};
use futures::future::join_all;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One output audio file, after collection at `split/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stem {
    pub name: String,
    pub path: PathBuf,
}

/// Relocates stems from the tool's output directory into `split/`.
pub struct StemCollector {
    output_root: PathBuf,
    workspace: Workspace,
    metrics: Arc<Metrics>,
}

impl StemCollector {
    /// `output_root` is the directory the tool writes per-job directories into.
    pub fn new(output_root: impl Into<PathBuf>, workspace: Workspace, metrics: Arc<Metrics>) -> Self {
        Self {
            output_root: output_root.into(),
            workspace,
            metrics,
        }
    }

    /// Directory the tool writes stems for `id` into.
    pub fn tool_output_dir(&self, id: &JobId) -> PathBuf {
        self.output_root.join(track_name(id))
    }

    /// Move every stem the tool produced for `id` into `split/`.
    ///
    /// All moves run concurrently and each failure is reported; a failed move
    /// never stops its siblings. The tool's output directory is removed
    /// afterwards whatever the outcome.
    pub async fn collect(&self, id: &JobId) -> Result<Vec<Stem>> {
        let result = self.relocate(id).await;
        self.discard_tool_output(id).await;
        result
    }

    /// Best-effort removal of the tool's output directory for `id`.
    pub async fn discard_tool_output(&self, id: &JobId) {
        let dir = self.tool_output_dir(id);
        if let Err(e) = remove_dir_if_exists(&dir).await {
            tracing::warn!(job_id = %id, "Failed to remove tool output {}: {}", dir.display(), e);
        }
    }

    async fn relocate(&self, id: &JobId) -> Result<Vec<Stem>> {
        let tool_dir = self.tool_output_dir(id);
        let entries = list_entries(&tool_dir).await?;
        if entries.is_empty() {
            return Err(PipelineError::NoOutput { dir: tool_dir });
        }

        let split_dir = self.workspace.split_dir(id);
        ensure(&split_dir).await?;

        let attempted = entries.len();
        let moves = entries.into_iter().map(|(name, from)| {
            let to = split_dir.join(&name);
            async move {
                match tokio::fs::rename(&from, &to).await {
                    Ok(()) => Ok(Stem { name, path: to }),
                    Err(e) => Err(TransferFailure {
                        name,
                        error: PipelineError::io(from, e),
                    }),
                }
            }
        });

        let mut stems = Vec::with_capacity(attempted);
        let mut failures = Vec::new();
        for result in join_all(moves).await {
            match result {
                Ok(stem) => {
                    self.metrics.add_stem_collected();
                    stems.push(stem);
                }
                Err(failure) => {
                    self.metrics.add_transfer_failure();
                    tracing::warn!(job_id = %id, "Failed to collect {}: {}", failure.name, failure.error);
                    failures.push(failure);
                }
            }
        }

        if !failures.is_empty() {
            return Err(TransferError {
                stage: TransferStage::Collect,
                attempted,
                failures,
            }
            .into());
        }

        tracing::info!(job_id = %id, "Collected {} stems into {}", stems.len(), split_dir.display());
        Ok(stems)
    }
}

/// Name the tool gives the track staged as `source/<id>`: the file name with
/// its last extension removed.
fn track_name(id: &JobId) -> &str {
    let name = id.as_str();
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

/// List `(name, path)` for every entry of `dir`. A missing directory means
/// the tool produced nothing.
async fn list_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PipelineError::NoOutput { dir: dir.to_path_buf() });
        }
        Err(e) => return Err(PipelineError::io(dir, e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| PipelineError::io(dir, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}
