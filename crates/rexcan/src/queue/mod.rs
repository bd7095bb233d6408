//! Durable job queue backed by the `queue_jobs` table.
//!
//! One job per document, keyed `doc-<documentId>`. Enqueueing while that
//! job is waiting or active is a no-op, so producers can retry freely.
//! Claims are atomic, so at most one worker owns a job at a time.

pub mod error;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::QueueConfig;
use crate::db::queue_repo::{self, NewQueueJob};
use crate::db::{now_millis, Database};

pub use error::QueueError;

/// Deterministic job key for a document.
pub fn job_key(document_id: &str) -> String {
    format!("doc-{}", document_id)
}

/// Delay before redelivery after failed attempt number `attempt` (1-based):
/// `base · 2^(attempt-1)`, i.e. 2s then 4s for the default 2s base.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(JobState::Waiting),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

/// What a worker needs to process a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub document_id: String,
    pub user_id: String,
    pub file_path: PathBuf,
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub profile: Option<String>,
}

/// A job owned by the worker that claimed it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub payload: JobPayload,
    /// 1-based attempt number of this delivery.
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// The job will be redelivered after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// No attempts remain, or the error was permanent.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Jobs returned to the queue or failed by a stall sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StallReport {
    pub requeued: usize,
    /// `(job id, document id)` of jobs that stalled on their last attempt.
    pub exhausted: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct JobStoreOptions {
    pub attempts: u32,
    pub backoff_base: Duration,
    pub completed_retention: Duration,
    pub completed_retention_count: u64,
    pub failed_retention: Duration,
}

impl Default for JobStoreOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_secs(2),
            completed_retention: Duration::from_secs(24 * 60 * 60),
            completed_retention_count: 1000,
            failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl From<&QueueConfig> for JobStoreOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            attempts: config.attempts,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            completed_retention: Duration::from_secs(config.completed_retention_secs),
            completed_retention_count: config.completed_retention_count,
            failed_retention: Duration::from_secs(config.failed_retention_secs),
        }
    }
}

/// The shared, persistent job queue.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
    options: JobStoreOptions,
}

impl JobStore {
    pub fn new(db: Database, options: JobStoreOptions) -> Self {
        Self { db, options }
    }

    pub fn options(&self) -> &JobStoreOptions {
        &self.options
    }

    /// Adds a job for `document_id`, returning its key.
    ///
    /// A job already waiting or active for the document is left as is.
    pub fn enqueue(&self, document_id: &str, payload: &JobPayload) -> Result<String, QueueError> {
        let id = job_key(document_id);
        let payload_json = serde_json::to_string(payload).map_err(QueueError::Payload)?;
        let created = queue_repo::upsert_waiting(
            &self.db,
            &NewQueueJob {
                id: &id,
                document_id,
                payload: &payload_json,
                max_attempts: self.options.attempts,
                backoff_base_ms: self.options.backoff_base.as_millis() as i64,
            },
            now_millis(),
        )?;

        if created {
            log::debug!("Enqueued job {}", id);
        } else {
            log::debug!("Job {} already outstanding, enqueue ignored", id);
        }
        Ok(id)
    }

    /// Claims the oldest due job for `worker_id`.
    pub fn claim(&self, worker_id: &str) -> Result<Option<ClaimedJob>, QueueError> {
        let Some(row) = queue_repo::claim_next(&self.db, worker_id, now_millis())? else {
            return Ok(None);
        };
        let payload: JobPayload = match serde_json::from_str(&row.payload) {
            Ok(payload) => payload,
            Err(e) => {
                // Unreadable payloads can never succeed.
                queue_repo::fail(&self.db, &row.id, &e.to_string(), true, now_millis())?;
                return Err(QueueError::Payload(e));
            }
        };
        Ok(Some(ClaimedJob {
            id: row.id,
            payload,
            attempt: row.attempts_made,
            max_attempts: row.max_attempts,
        }))
    }

    pub fn complete(&self, job_id: &str) -> Result<(), QueueError> {
        if queue_repo::complete(&self.db, job_id, now_millis())? {
            Ok(())
        } else {
            Err(QueueError::NotActive(job_id.to_string()))
        }
    }

    /// Reports a failed attempt. Permanent errors exhaust the job at once.
    pub fn fail(&self, job_id: &str, error: &str, permanent: bool) -> Result<FailOutcome, QueueError> {
        queue_repo::fail(&self.db, job_id, error, permanent, now_millis())?
            .ok_or_else(|| QueueError::NotActive(job_id.to_string()))
    }

    /// Requeues active jobs whose lock is older than `stalled_after`.
    pub fn reclaim_stalled(&self, stalled_after: Duration) -> Result<StallReport, QueueError> {
        let now = now_millis();
        let cutoff = now - stalled_after.as_millis() as i64;
        let (requeued, exhausted) = queue_repo::reclaim_stalled(&self.db, cutoff, now)?;
        if requeued > 0 || !exhausted.is_empty() {
            log::warn!(
                "Reclaimed {} stalled jobs, {} failed on their final attempt",
                requeued,
                exhausted.len()
            );
        }
        Ok(StallReport {
            requeued,
            exhausted,
        })
    }

    /// Deletes finished jobs past their retention window.
    pub fn purge_expired(&self) -> Result<usize, QueueError> {
        let now = now_millis();
        let removed = queue_repo::purge_finished(
            &self.db,
            now - self.options.completed_retention.as_millis() as i64,
            self.options.completed_retention_count,
            now - self.options.failed_retention.as_millis() as i64,
        )?;
        if removed > 0 {
            log::debug!("Purged {} finished jobs", removed);
        }
        Ok(removed)
    }

    pub fn counts(&self) -> Result<QueueCounts, QueueError> {
        Ok(queue_repo::counts(&self.db, now_millis())?)
    }

    /// State of the job for `document_id`, if one is retained.
    pub fn state_of(&self, document_id: &str) -> Result<Option<JobState>, QueueError> {
        Ok(queue_repo::find_by_id(&self.db, &job_key(document_id))?.map(|r| r.state))
    }
}
