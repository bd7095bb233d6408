use thiserror::Error;

use crate::db::DatabaseError;
use crate::document::TransitionError;
use crate::extraction::ExtractionError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Document(#[from] TransitionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Malformed extraction result: {0}")]
    MalformedResult(#[source] serde_json::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Document {0} kept changing status while the job started")]
    Contended(String),
}

impl PipelineError {
    /// Errors no redelivery can fix. The job is failed without using the
    /// remaining attempts.
    pub fn is_permanent(&self) -> bool {
        match self {
            PipelineError::Extraction(e) => matches!(
                e,
                ExtractionError::NotFound { .. }
                    | ExtractionError::Decode { .. }
                    | ExtractionError::Io { .. }
                    | ExtractionError::InvalidConfig(_)
            ),
            PipelineError::MalformedResult(_) => true,
            PipelineError::Document(TransitionError::Database(_)) => false,
            PipelineError::Document(_) => true,
            PipelineError::Database(_) | PipelineError::Contended(_) => false,
        }
    }
}
