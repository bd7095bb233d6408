pub mod job;
pub mod maintenance;
pub mod pool;
pub mod rate_limit;

pub use job::{JobOutcome, JobResult};
pub use pool::{Broadcasters, WorkerOptions, WorkerPool};
pub use rate_limit::StartLimiter;
