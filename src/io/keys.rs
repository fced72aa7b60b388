//! Storage key layout for transmissions.

use crate::job::JobId;
use object_store::path::Path;

/// Key of a transmission's source audio: `transmissions/<id>/sourceAudio`.
pub fn source_key(id: &JobId) -> Path {
    Path::from(format!("transmissions/{id}/sourceAudio"))
}

/// Key of one uploaded stem: `transmissions/<id>/channels/<stem>`.
pub fn channel_key(id: &JobId, stem: &str) -> Path {
    Path::from(format!("transmissions/{id}/channels/{stem}"))
}
