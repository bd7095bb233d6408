use thiserror::Error;

use crate::db::DatabaseError;
use crate::extraction::ExtractionError;
use crate::queue::QueueError;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {0} has not been submitted for extraction")]
    NotSubmitted(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
