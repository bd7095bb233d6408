use thiserror::Error;

use crate::db::DatabaseError;
use crate::document::{DocumentStatus, TransitionError};
use crate::extraction::ExtractionError;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {0} has not been submitted for extraction")]
    NotSubmitted(String),

    #[error("Document {document_id} is {status}; corrections need a processed or failed document")]
    InvalidState {
        document_id: String,
        status: DocumentStatus,
    },

    #[error("Field '{0}' cannot be corrected")]
    UnknownField(String),

    #[error("Invalid value for corrected fields: {0}")]
    InvalidValue(#[source] serde_json::Error),

    #[error("Invalid vendor name: '{0}'")]
    InvalidVendor(String),

    #[error("Extraction service returned an unreadable result: {0}")]
    MalformedResult(#[source] serde_json::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<TransitionError> for ReviewError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NotFound(id) => ReviewError::NotFound(id),
            TransitionError::Database(db) => ReviewError::Database(db),
            TransitionError::NotTerminal {
                document_id,
                status,
            } => ReviewError::InvalidState {
                document_id,
                status,
            },
            TransitionError::InvalidTransition {
                document_id, from, ..
            } => ReviewError::InvalidState {
                document_id,
                status: from,
            },
        }
    }
}
