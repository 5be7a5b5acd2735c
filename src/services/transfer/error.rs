use crate::services::storage::StoreError;
use thiserror::Error;

/// Failure of a single job, or of the batch as a whole.
///
/// Job-level variants carry the remote key that failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to open payload for {key}: {source}")]
    PayloadOpen {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read payload for {key}: {source}")]
    PayloadRead {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to finalize {key}: {source}")]
    Finalize {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to grant public read on {key}: {source}")]
    Visibility {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to fetch metadata of {key}: {source}")]
    Metadata {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to delete {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("batch deadline exceeded while processing {key}")]
    DeadlineExceeded { key: String },

    #[error("batch deadline exceeded after {completed} of {expected} jobs reported")]
    BatchDeadlineExceeded { completed: usize, expected: usize },

    #[error("transfer workers stopped after {completed} of {expected} jobs reported")]
    WorkersLost { completed: usize, expected: usize },
}

impl TransferError {
    /// Remote key of the failed job, if the error belongs to one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::PayloadOpen { key, .. }
            | Self::PayloadRead { key, .. }
            | Self::Write { key, .. }
            | Self::Finalize { key, .. }
            | Self::Visibility { key, .. }
            | Self::Metadata { key, .. }
            | Self::Delete { key, .. }
            | Self::DeadlineExceeded { key } => Some(key),
            Self::BatchDeadlineExceeded { .. } | Self::WorkersLost { .. } => None,
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded { .. } | Self::BatchDeadlineExceeded { .. }
        )
    }

    /// The object changed between the metadata fetch and the conditional delete.
    pub fn is_generation_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Delete {
                source: StoreError::GenerationMismatch { .. },
                ..
            }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Metadata {
                source: StoreError::NotFound(_),
                ..
            } | Self::Delete {
                source: StoreError::NotFound(_),
                ..
            }
        )
    }
}
