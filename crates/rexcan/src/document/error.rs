use thiserror::Error;

use super::status::DocumentStatus;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Illegal transition for document {document_id}: {from} -> {to}")]
    InvalidTransition {
        document_id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Document {document_id} is {status}, expected processed or failed")]
    NotTerminal {
        document_id: String,
        status: DocumentStatus,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
