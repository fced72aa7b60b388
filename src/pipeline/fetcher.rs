//! Stage the source audio of a transmission on local disk.

use crate::error::{PipelineError, Result};
use crate::io::source_key;
use crate::job::JobId;
use crate::pipeline::Metrics;
use crate::workspace::{ensure, Workspace};
use futures::StreamExt;
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// The downloaded source audio, at `source/<id>` inside the workspace.
#[derive(Debug, Clone)]
pub struct StagedAsset {
    pub path: PathBuf,
    pub size: u64,
}

/// Downloads source audio from durable storage into the job workspace.
pub struct SourceFetcher {
    store: Arc<dyn ObjectStore>,
    workspace: Workspace,
    metrics: Arc<Metrics>,
}

impl SourceFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, workspace: Workspace, metrics: Arc<Metrics>) -> Self {
        Self { store, workspace, metrics }
    }

    /// Stream `transmissions/<id>/sourceAudio` into `source/<id>`.
    ///
    /// A partially written file is left behind on failure; workspace teardown
    /// removes it.
    pub async fn fetch(&self, id: &JobId) -> Result<StagedAsset> {
        ensure(&self.workspace.source_dir(id)).await?;

        let key = source_key(id);
        let result = self
            .store
            .get(&key)
            .await
            .map_err(|e| PipelineError::storage(key.to_string(), e))?;

        let path = self.workspace.source_file(id);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| PipelineError::io(&path, e))?;

        let mut body = result.into_stream();
        let mut size = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| PipelineError::InvalidBody {
                key: key.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::io(&path, e))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| PipelineError::io(&path, e))?;

        self.metrics.add_bytes_downloaded(size);
        tracing::info!(job_id = %id, bytes = size, "Staged source audio at {}", path.display());

        Ok(StagedAsset { path, size })
    }
}
