use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RexcanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("Extraction service error: {0}")]
    Extraction(#[from] crate::extraction::ExtractionError),

    #[error("Document error: {0}")]
    Transition(#[from] crate::document::TransitionError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Upload error: {0}")]
    Intake(#[from] crate::intake::IntakeError),

    #[error("Batch error: {0}")]
    Batch(#[from] crate::batch::BatchError),

    #[error("Review error: {0}")]
    Review(#[from] crate::review::ReviewError),

    #[error("Status error: {0}")]
    Status(#[from] crate::status::StatusError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker thread panicked")]
    ThreadPanic,

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(#[source] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, RexcanError>;
