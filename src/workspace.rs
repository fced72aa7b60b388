//! Per-job temporary directory tree on local disk.
//!
//! Layout for a job `<id>`:
//!
//! ```text
//! <tmp_root>/<id>/
//! ├── source/<id>        staged source audio
//! └── split/<stem>...    collected stems
//! ```

use crate::error::{PipelineError, Result};
use crate::job::JobId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SOURCE_DIR: &str = "source";
const SPLIT_DIR: &str = "split";

/// Pure path derivation for job workspaces under a temporary root.
#[derive(Debug, Clone)]
pub struct Workspace {
    tmp_root: PathBuf,
}

impl Workspace {
    pub fn new(tmp_root: impl Into<PathBuf>) -> Self {
        Self { tmp_root: tmp_root.into() }
    }

    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    /// `<tmp_root>/<id>`
    pub fn root(&self, id: &JobId) -> PathBuf {
        self.tmp_root.join(id.as_str())
    }

    /// `<tmp_root>/<id>/source`
    pub fn source_dir(&self, id: &JobId) -> PathBuf {
        self.root(id).join(SOURCE_DIR)
    }

    /// `<tmp_root>/<id>/split`
    pub fn split_dir(&self, id: &JobId) -> PathBuf {
        self.root(id).join(SPLIT_DIR)
    }

    /// `<tmp_root>/<id>/source/<id>`
    pub fn source_file(&self, id: &JobId) -> PathBuf {
        self.source_dir(id).join(id.as_str())
    }

    /// Recursively remove the job's root directory.
    ///
    /// A missing directory counts as already clean.
    pub async fn teardown(&self, id: &JobId) -> std::io::Result<()> {
        remove_dir_if_exists(&self.root(id)).await
    }
}

/// Create `path` and any missing parents. Succeeds if it already exists.
pub async fn ensure(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| PipelineError::io(path, e))
}

/// Recursively remove `path`, treating a missing directory as success.
pub(crate) async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_derivation() {
        let workspace = Workspace::new("/var/tmp/splitter");
        let id = JobId::new("abc123").unwrap();

        assert_eq!(workspace.root(&id), PathBuf::from("/var/tmp/splitter/abc123"));
        assert_eq!(workspace.source_dir(&id), PathBuf::from("/var/tmp/splitter/abc123/source"));
        assert_eq!(workspace.split_dir(&id), PathBuf::from("/var/tmp/splitter/abc123/split"));
        assert_eq!(
            workspace.source_file(&id),
            PathBuf::from("/var/tmp/splitter/abc123/source/abc123")
        );
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("c");

        ensure(&path).await.unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();
        ensure(&path).await.unwrap();

        assert!(path.is_dir());
        let entries: Vec<_> = std::fs::read_dir(&path).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_fails_on_file_in_the_way() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let err = ensure(&blocker.join("child")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[tokio::test]
    async fn test_teardown_removes_tree() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::new(temp_dir.path());
        let id = JobId::new("job-1").unwrap();

        ensure(&workspace.source_dir(&id)).await.unwrap();
        ensure(&workspace.split_dir(&id)).await.unwrap();
        std::fs::write(workspace.source_file(&id), b"audio").unwrap();

        workspace.teardown(&id).await.unwrap();
        assert!(!workspace.root(&id).exists());
        assert!(temp_dir.path().exists());
    }

    #[tokio::test]
    async fn test_teardown_missing_directory_is_clean() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::new(temp_dir.path());
        let id = JobId::new("never-created").unwrap();

        workspace.teardown(&id).await.unwrap();
        workspace.teardown(&id).await.unwrap();
    }
}
