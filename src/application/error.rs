use thiserror::Error;

use crate::domain::document_client::ClientError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field is missing or malformed.
    #[error("invalid todo: {0}")]
    Validation(String),

    #[error("todo {id} not found")]
    NotFound { id: String },

    /// Connectivity, timeout or unexpected backend failure.
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: ClientError,
    },

    /// The backend answered a write without error but did not apply it.
    #[error("backend did not store todo {id}")]
    WriteFailed { id: String },

    #[error("todo {id} has a malformed payload: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Some deletes of a bulk delete failed; the others were applied.
    #[error("failed to delete {failed} of {attempted} todos: {first}")]
    PartialDelete {
        failed: usize,
        attempted: usize,
        #[source]
        first: ClientError,
    },

    /// A bulk delete stopped finding anything to remove while the index
    /// still reported matches.
    #[error("{remaining} todos remain after deleting all")]
    Incomplete { remaining: u64 },
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

    pub fn not_found(id: impl Into<String>) -> Self { Self::NotFound { id: id.into() } }

    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }

    /// Client errors are the caller's fault; everything else is ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}
