//! Batch uploads and derived batch progress.
//!
//! A batch is only a shared `batch_id` on its documents. Its progress is
//! recomputed from their statuses on every read.

pub mod error;

use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

pub use error::BatchError;

use crate::db::{document_repo, Database};
use crate::document::{Document, DocumentStatus};
use crate::intake::{Intake, IntakeError, UploadRequest};

/// One file of a batch upload.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub filename: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedUpload {
    pub filename: String,
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedUpload {
    pub filename: String,
    pub reason: String,
    /// Set when the document was stored but could not be queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadReport {
    pub batch_id: String,
    pub accepted: Vec<AcceptedUpload>,
    pub rejected: Vec<RejectedUpload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub batch_id: String,
    pub total: u64,
    pub uploaded: u64,
    pub queued: u64,
    pub processing: u64,
    pub processed: u64,
    pub failed: u64,
    /// `processed + failed`.
    pub completed: u64,
    /// `uploaded + queued + processing`.
    pub in_progress: u64,
    /// Percentage of completed documents, rounded.
    pub progress: u8,
    /// Every document reached a terminal status, successful or not.
    pub done: bool,
}

impl BatchStatus {
    /// Rolls up per-status counts.
    pub fn from_counts(batch_id: &str, counts: &[(DocumentStatus, u64)]) -> Self {
        let mut status = BatchStatus {
            batch_id: batch_id.to_string(),
            ..BatchStatus::default()
        };
        for (doc_status, count) in counts {
            match doc_status {
                DocumentStatus::Uploaded => status.uploaded += count,
                DocumentStatus::Queued => status.queued += count,
                DocumentStatus::Processing => status.processing += count,
                DocumentStatus::Processed => status.processed += count,
                DocumentStatus::Failed => status.failed += count,
            }
        }
        status.total =
            status.uploaded + status.queued + status.processing + status.processed + status.failed;
        status.completed = status.processed + status.failed;
        status.in_progress = status.uploaded + status.queued + status.processing;
        status.progress = if status.total == 0 {
            0
        } else {
            (status.completed as f64 / status.total as f64 * 100.0).round() as u8
        };
        status.done = status.completed == status.total;
        status
    }
}

#[derive(Clone)]
pub struct BatchCoordinator {
    db: Database,
    intake: Intake,
}

impl BatchCoordinator {
    pub fn new(db: Database, intake: Intake) -> Self {
        Self { db, intake }
    }

    pub fn get_batch_status(&self, batch_id: &str) -> Result<BatchStatus, BatchError> {
        let counts = document_repo::count_by_status_for_batch(&self.db, batch_id)?;
        if counts.is_empty() {
            return Err(BatchError::NotFound(batch_id.to_string()));
        }
        Ok(BatchStatus::from_counts(batch_id, &counts))
    }

    /// Uploads every file under a fresh batch id.
    ///
    /// Each file is accepted or rejected on its own; one bad file never
    /// stops the rest.
    pub fn upload_batch(
        &self,
        user_id: &str,
        files: Vec<BatchFile>,
        profile: Option<&str>,
    ) -> BatchUploadReport {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut report = BatchUploadReport {
            batch_id: batch_id.clone(),
            accepted: Vec::new(),
            rejected: Vec::new(),
        };

        for file in files {
            let request = UploadRequest {
                user_id: user_id.to_string(),
                filename: file.filename.clone(),
                file_path: file.file_path,
                file_size: file.file_size,
                mime_type: file.mime_type,
                profile: profile.map(|p| p.to_string()),
                batch_id: Some(batch_id.clone()),
            };
            match self.intake.upload(request) {
                Ok(doc) => report.accepted.push(AcceptedUpload {
                    filename: doc.filename,
                    document_id: doc.id,
                }),
                Err(IntakeError::QueueUnavailable { document_id, source }) => {
                    report.rejected.push(RejectedUpload {
                        filename: file.filename,
                        reason: source.to_string(),
                        document_id: Some(document_id),
                    })
                }
                Err(e) => {
                    warn!("Batch {}: rejected {}: {}", batch_id, file.filename, e);
                    report.rejected.push(RejectedUpload {
                        filename: file.filename,
                        reason: e.to_string(),
                        document_id: None,
                    })
                }
            }
        }

        info!(
            "Batch {}: {} accepted, {} rejected",
            batch_id,
            report.accepted.len(),
            report.rejected.len()
        );
        report
    }

    pub fn list_documents(&self, batch_id: &str) -> Result<Vec<Document>, BatchError> {
        Ok(document_repo::list_by_batch(&self.db, batch_id)?)
    }
}
