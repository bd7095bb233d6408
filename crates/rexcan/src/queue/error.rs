use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job store unavailable: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid job payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Job {0} is not active")]
    NotActive(String),
}
