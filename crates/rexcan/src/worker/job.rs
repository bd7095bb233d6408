use std::time::Duration;

/// What happened to one delivery of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Processed {
        external_job_id: String,
        is_duplicate: bool,
    },
    /// The document was already processed by an earlier delivery.
    AlreadyProcessed,
    /// The attempt failed; the job is due again after `delay`. The
    /// document stays `processing`.
    Retrying { delay: Duration, error: String },
    /// No attempts left, or a permanent error. The document is `failed`.
    Failed { error: String },
    /// The failure could not be recorded; the stall sweep will redeliver.
    Abandoned { error: String },
}

/// Published on the pool's result channel after every delivery.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub document_id: String,
    pub attempt: u32,
    pub outcome: JobOutcome,
}

impl JobResult {
    /// Whether the document reached `processed` or `failed`.
    pub fn is_final(&self) -> bool {
        matches!(
            self.outcome,
            JobOutcome::Processed { .. } | JobOutcome::AlreadyProcessed | JobOutcome::Failed { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            JobOutcome::Processed { .. } | JobOutcome::AlreadyProcessed
        )
    }
}
