pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use context::{Entry, PipelineContext};
pub use error::PipelineError;
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{transform_result, Pipeline, PipelineOutcome};
