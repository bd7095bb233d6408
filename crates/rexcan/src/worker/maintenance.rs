//! Periodic queue upkeep: stall recovery and retention.

use std::time::Duration;

use log::{debug, warn};

use crate::db::{document_repo, Database};
use crate::document::{DocumentStatus, TransitionError};
use crate::queue::{JobStore, QueueError, StallReport};

/// Error message recorded on documents whose job stalled on its last attempt.
pub const STALLED_ERROR: &str = "Job stalled on its final attempt";

/// Moves a document to `failed` at the end of its job's budget.
///
/// A document still `queued` (its job failed before step 1 completed) is
/// taken through `processing` so only legal transitions are used.
pub fn fail_document(db: &Database, document_id: &str, error: &str) -> Result<(), TransitionError> {
    let doc = document_repo::get(db, document_id)?;
    match doc.status {
        DocumentStatus::Processing => document_repo::mark_failed(db, document_id, error),
        DocumentStatus::Queued => {
            document_repo::mark_processing(db, document_id)?;
            document_repo::mark_failed(db, document_id, error)
        }
        status => {
            debug!(
                "Document {} is {}, leaving it as is after job failure",
                document_id, status
            );
            Ok(())
        }
    }
}

/// One maintenance pass: requeue stalled jobs, fail the documents of jobs
/// that stalled on their last attempt, and purge expired jobs.
pub fn sweep(
    store: &JobStore,
    db: &Database,
    stalled_after: Duration,
) -> Result<StallReport, QueueError> {
    let report = store.reclaim_stalled(stalled_after)?;
    for (job_id, document_id) in &report.exhausted {
        if let Err(e) = fail_document(db, document_id, STALLED_ERROR) {
            warn!(
                "Failed to mark document {} of stalled job {} as failed: {}",
                document_id, job_id, e
            );
        }
    }
    store.purge_expired()?;
    Ok(report)
}
