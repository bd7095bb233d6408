//! Job progress broadcaster for real-time document status streaming.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of a document's extraction protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Claimed,
    Submitting,
    Extracting,
    Transforming,
    DuplicateCheck,
    Persisting,
    Retrying,
    Completed,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Claimed => write!(f, "Claimed"),
            JobPhase::Submitting => write!(f, "Submitting to extraction service"),
            JobPhase::Extracting => write!(f, "Extracting"),
            JobPhase::Transforming => write!(f, "Normalizing result"),
            JobPhase::DuplicateCheck => write!(f, "Checking for duplicates"),
            JobPhase::Persisting => write!(f, "Persisting"),
            JobPhase::Retrying => write!(f, "Retrying"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

/// Progress event for one document's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub document_id: String,
    /// Queue job key (`doc-<documentId>`).
    pub job_id: String,
    pub filename: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn new(
        document_id: &str,
        job_id: &str,
        filename: &str,
        phase: JobPhase,
        message: &str,
    ) -> Self {
        let status = match phase {
            JobPhase::Completed => JobStatus::Completed,
            JobPhase::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        };

        Self {
            document_id: document_id.to_string(),
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            phase,
            status,
            message: message.to_string(),
            timestamp: Utc::now(),
            attempt: None,
            external_job_id: None,
            is_duplicate: None,
            retry_in_ms: None,
            error: None,
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one claimed job.
    pub fn track(
        &self,
        document_id: &str,
        job_id: &str,
        filename: &str,
        attempt: u32,
    ) -> JobProgressTracker {
        JobProgressTracker {
            document_id: document_id.to_string(),
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            attempt,
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Tracks progress for a single job attempt.
pub struct JobProgressTracker {
    document_id: String,
    job_id: String,
    filename: String,
    attempt: u32,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    fn event(&self, phase: JobPhase, message: &str) -> JobProgressEvent {
        let mut event =
            JobProgressEvent::new(&self.document_id, &self.job_id, &self.filename, phase, message);
        event.attempt = Some(self.attempt);
        event
    }

    pub fn update_phase(&self, phase: JobPhase, message: &str) {
        let _ = self.sender.send(self.event(phase, message));
    }

    pub fn completed(&self, external_job_id: &str, is_duplicate: bool) {
        let mut event = self.event(JobPhase::Completed, "Document processed");
        event.external_job_id = Some(external_job_id.to_string());
        event.is_duplicate = Some(is_duplicate);
        let _ = self.sender.send(event);
    }

    pub fn retrying(&self, delay: Duration, error: &str) {
        let mut event = self.event(JobPhase::Retrying, "Attempt failed, retry scheduled");
        event.retry_in_ms = Some(delay.as_millis() as u64);
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, error: &str) {
        let mut event = self.event(JobPhase::Failed, "Processing failed");
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
