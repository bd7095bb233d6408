pub mod batch;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod extraction;
pub mod intake;
pub mod pipeline;
pub mod queue;
pub mod review;
pub mod sanitize;
pub mod status;
pub mod telemetry;
pub mod worker;

pub use batch::{BatchCoordinator, BatchStatus, BatchUploadReport};
pub use broadcast::{JobProgressBroadcaster, LogBroadcaster};
pub use config::{load_config, Config};
pub use db::Database;
pub use document::{Document, DocumentStatus, ExtractedData};
pub use error::{ConfigError, Result, RexcanError, WorkerError};
pub use extraction::{ExtractionClient, ExtractionService, HttpExtractionService};
pub use intake::{Intake, UploadRequest};
pub use pipeline::{Pipeline, PipelineContext};
pub use queue::JobStore;
pub use review::{CorrectionRequest, ReviewService};
pub use status::{RemoteStatus, StatusService, StatusView};
pub use worker::{Broadcasters, WorkerOptions, WorkerPool};
