//! Upload collected stems to durable storage as transmission channels.

use crate::error::{PipelineError, Result, TransferError, TransferFailure, TransferStage};
use crate::io::channel_key;
use crate::job::JobId;
use crate::pipeline::Metrics;
use crate::workspace::Workspace;
use futures::future::join_all;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Files at or above this size are streamed as multipart uploads.
const MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Read size when streaming a multipart upload.
const READ_CHUNK: usize = 1024 * 1024;

/// Parts of one upload allowed in flight at once.
const MAX_PARTS_IN_FLIGHT: usize = 4;

/// Uploads every file in `split/` under `transmissions/<id>/channels/`.
pub struct ChannelUploader {
    store: Arc<dyn ObjectStore>,
    workspace: Workspace,
    metrics: Arc<Metrics>,
}

impl ChannelUploader {
    pub fn new(store: Arc<dyn ObjectStore>, workspace: Workspace, metrics: Arc<Metrics>) -> Self {
        Self { store, workspace, metrics }
    }

    /// Upload all stems of `id` concurrently and return the uploaded names.
    ///
    /// Every upload runs to completion even if a sibling fails; any failure
    /// makes the whole call fail with a [`TransferError`] listing each one.
    pub async fn upload_all(&self, id: &JobId) -> Result<Vec<String>> {
        let split_dir = self.workspace.split_dir(id);
        let files = list_files(&split_dir).await?;
        let attempted = files.len();

        let uploads = files.into_iter().map(|(name, path)| async move {
            match self.upload_one(id, &name, &path).await {
                Ok(bytes) => Ok((name, bytes)),
                Err(error) => Err(TransferFailure { name, error }),
            }
        });

        let mut uploaded = Vec::with_capacity(attempted);
        let mut failures = Vec::new();
        for result in join_all(uploads).await {
            match result {
                Ok((name, bytes)) => {
                    self.metrics.add_stem_uploaded();
                    self.metrics.add_bytes_uploaded(bytes);
                    uploaded.push(name);
                }
                Err(failure) => {
                    self.metrics.add_transfer_failure();
                    tracing::warn!(job_id = %id, "Failed to upload {}: {}", failure.name, failure.error);
                    failures.push(failure);
                }
            }
        }

        if !failures.is_empty() {
            return Err(TransferError {
                stage: TransferStage::Upload,
                attempted,
                failures,
            }
            .into());
        }

        tracing::info!(job_id = %id, "Uploaded {} channels", uploaded.len());
        Ok(uploaded)
    }

    /// Upload one file, returning the number of bytes sent.
    ///
    /// The file handle is closed before the upload is finalised, on success
    /// and on failure alike.
    async fn upload_one(&self, id: &JobId, name: &str, path: &Path) -> Result<u64> {
        let key = channel_key(id, name);
        let mut file = File::open(path).await.map_err(|e| PipelineError::io(path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| PipelineError::io(path, e))?
            .len();

        if size < MULTIPART_THRESHOLD {
            let mut data = Vec::with_capacity(size as usize);
            let read = file.read_to_end(&mut data).await;
            drop(file);
            read.map_err(|e| PipelineError::io(path, e))?;

            let bytes = data.len() as u64;
            self.store
                .put(&key, PutPayload::from(data))
                .await
                .map_err(|e| PipelineError::storage(key.to_string(), e))?;
            return Ok(bytes);
        }

        let upload = self
            .store
            .put_multipart(&key)
            .await
            .map_err(|e| PipelineError::storage(key.to_string(), e))?;
        let mut writer = WriteMultipart::new(upload);

        let copied = stream_file(&mut file, &mut writer, path, &key).await;
        drop(file);

        match copied {
            Ok(bytes) => {
                writer
                    .finish()
                    .await
                    .map_err(|e| PipelineError::storage(key.to_string(), e))?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!("Failed to abort upload of {}: {}", key, abort_err);
                }
                Err(e)
            }
        }
    }
}

async fn stream_file(
    file: &mut File,
    writer: &mut WriteMultipart,
    path: &Path,
    key: &ObjectPath,
) -> Result<u64> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(|e| PipelineError::io(path, e))?;
        if n == 0 {
            return Ok(total);
        }
        writer
            .wait_for_capacity(MAX_PARTS_IN_FLIGHT)
            .await
            .map_err(|e| PipelineError::storage(key.to_string(), e))?;
        writer.write(&buf[..n]);
        total += n as u64;
    }
}

/// List `(name, path)` for every entry of the split directory.
async fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PipelineError::io(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| PipelineError::io(dir, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.path()));
    }
    files.sort();
    Ok(files)
}
