use thiserror::Error;

use crate::DocId;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Upstream could not produce text for the document.
    #[error("text extraction failed for `{id}`: {reason}")]
    ExtractionFailure { id: DocId, reason: String },

    /// `add_document` was called for an id that is still indexed.
    #[error("document `{0}` is already indexed; remove it before adding it again")]
    DuplicateDocument(DocId),

    /// Internal consistency check failed. The affected index must be rebuilt.
    #[error("index invariant violated: {0}")]
    IndexCorruption(String),

    #[error("index unavailable: a rebuild is in progress")]
    IndexUnavailable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start background worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
