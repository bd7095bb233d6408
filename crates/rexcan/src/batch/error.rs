use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
