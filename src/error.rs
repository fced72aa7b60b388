//! Error types for the splitting pipeline.
//!
//! Every stage returns [`PipelineError`]. The orchestrator captures the first
//! stage error verbatim and re-surfaces it after cleanup; cleanup failures are
//! only logged.

use std::fmt;
use std::path::PathBuf;

/// Result alias used by the pipeline stages.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors raised by pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The job id cannot be used as a path segment or key component.
    #[error("invalid job id {0:?}")]
    InvalidJobId(String),

    /// Durable storage has no object under the requested key.
    #[error("source object not found: {key}")]
    NotFound { key: String },

    /// Durable storage request failed for a reason other than a missing object.
    #[error("storage request for {key} failed: {source}")]
    Storage {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// The storage response body could not be read.
    #[error("object {key} has no readable body: {source}")]
    InvalidBody {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// Local filesystem failure.
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The separation tool could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The separation tool ran but did not exit cleanly.
    #[error("separation tool failed: {}", describe_exit(*code, *signal))]
    ToolExecution {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// The separation tool exited cleanly but produced no stems.
    #[error("separation tool produced no output in {}", dir.display())]
    NoOutput { dir: PathBuf },

    /// One or more concurrent moves or uploads failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.into(), source }
    }

    /// Map an object store error for `key`, keeping missing objects distinct.
    pub(crate) fn storage(key: impl Into<String>, source: object_store::Error) -> Self {
        let key = key.into();
        match source {
            object_store::Error::NotFound { .. } => PipelineError::NotFound { key },
            source => PipelineError::Storage { key, source },
        }
    }

    /// Exit code carried by a [`PipelineError::ToolExecution`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::ToolExecution { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_exit(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("non-zero exit code ({code})"),
        (None, Some(signal)) => format!("terminated by signal {signal}"),
        (None, None) => "terminated without an exit code".to_string(),
    }
}

/// Which fan-out stage a [`TransferError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Collect,
    Upload,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::Collect => write!(f, "collect"),
            TransferStage::Upload => write!(f, "upload"),
        }
    }
}

/// A single failed item inside a [`TransferError`].
#[derive(Debug)]
pub struct TransferFailure {
    /// File name of the stem that failed.
    pub name: String,
    pub error: PipelineError,
}

/// Aggregate of the failed items of one concurrent fan-out.
///
/// Every sibling operation has finished by the time this is built, so
/// `attempted - failures.len()` items completed successfully.
#[derive(Debug)]
pub struct TransferError {
    pub stage: TransferStage,
    pub attempted: usize,
    pub failures: Vec<TransferFailure>,
}

impl TransferError {
    /// True when no item of the fan-out succeeded.
    pub fn all_failed(&self) -> bool {
        self.failures.len() == self.attempted
    }

    /// Names of the failed items.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for {} of {} stems",
            self.stage,
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for TransferError {}
