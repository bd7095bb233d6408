//! Broadcasters for real-time event streaming.
//!
//! Both use `tokio::sync::broadcast`, so subscribers can live on a runtime
//! while workers publish from plain threads.

pub mod job_progress;
pub mod log_broadcaster;

pub use job_progress::{
    JobPhase, JobProgressBroadcaster, JobProgressEvent, JobProgressTracker, JobStatus,
};
pub use log_broadcaster::{LogBroadcaster, LogEvent};
