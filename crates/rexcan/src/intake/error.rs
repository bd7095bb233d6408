use thiserror::Error;

use super::validation::ValidationError;
use crate::db::DatabaseError;
use crate::document::{Denial, DocumentStatus, TransitionError};
use crate::queue::QueueError;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Upload rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// The document exists in `uploaded`; the enqueue can be retried.
    #[error("Document {document_id} saved but not queued: {source}")]
    QueueUnavailable {
        document_id: String,
        #[source]
        source: QueueError,
    },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {document_id} is {status}; operation not allowed ({denial:?})")]
    InvalidState {
        document_id: String,
        status: DocumentStatus,
        denial: Denial,
    },

    #[error(transparent)]
    Transition(TransitionError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<TransitionError> for IntakeError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NotFound(id) => IntakeError::NotFound(id),
            TransitionError::Database(db) => IntakeError::Database(db),
            other => IntakeError::Transition(other),
        }
    }
}
