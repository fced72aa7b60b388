//! Job identity.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::sync::Arc;

/// Opaque, caller-supplied identifier of one transmission.
///
/// The id becomes a directory name and a storage key segment, so it must be
/// a single non-empty path component. Leading dots are rejected: the
/// separation tool names its output after the id minus its last extension,
/// which would be empty for ids like `.wav`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(Arc<str>);

impl JobId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let invalid = raw.is_empty() || raw.starts_with('.') || raw.contains(['/', '\\', '\0']);
        if invalid {
            return Err(PipelineError::InvalidJobId(raw.to_string()));
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
