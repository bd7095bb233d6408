use crate::broadcast::job_progress::{JobPhase, JobProgressTracker};
use crate::broadcast::LogBroadcaster;

/// Events emitted by the pipeline while it drives one job.
pub enum ProgressEvent {
    Phase { phase: JobPhase, message: String },
    Completed {
        external_job_id: String,
        is_duplicate: bool,
    },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards pipeline events to the progress channel and the document's
/// log lines.
pub struct BroadcastProgress {
    document_id: String,
    tracker: JobProgressTracker,
    logs: LogBroadcaster,
}

impl BroadcastProgress {
    pub fn new(document_id: &str, tracker: JobProgressTracker, logs: LogBroadcaster) -> Self {
        Self {
            document_id: document_id.to_string(),
            tracker,
            logs,
        }
    }

    pub fn tracker(&self) -> &JobProgressTracker {
        &self.tracker
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => {
                self.logs.info(&self.document_id, &message);
                self.tracker.update_phase(phase, &message);
            }
            ProgressEvent::Completed {
                external_job_id,
                is_duplicate,
            } => {
                let message = if is_duplicate {
                    "Processed (duplicate of an existing invoice)"
                } else {
                    "Processed"
                };
                self.logs.info(&self.document_id, message);
                self.tracker.completed(&external_job_id, is_duplicate);
            }
            ProgressEvent::Failed { error } => {
                self.logs.error(&self.document_id, &error);
                self.tracker.failed(&error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::JobProgressBroadcaster;

    #[test]
    fn test_phase_goes_to_both_channels() {
        let progress = JobProgressBroadcaster::new(10);
        let logs = LogBroadcaster::new(10);
        let mut rx = progress.subscribe();
        let reporter = BroadcastProgress::new(
            "d1",
            progress.track("d1", "doc-d1", "a.pdf", 1),
            logs.clone(),
        );

        reporter.report(ProgressEvent::Phase {
            phase: JobPhase::Extracting,
            message: "Extracting fields".to_string(),
        });

        assert_eq!(rx.try_recv().unwrap().phase, JobPhase::Extracting);
        assert_eq!(logs.recent("d1")[0].message, "Extracting fields");
    }
}
