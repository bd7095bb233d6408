//! Document intake: validate an upload, record it, and hand it to the queue.
//!
//! The document row is written before the job exists. If the enqueue fails
//! the document stays `uploaded` and [`Intake::enqueue_existing`] can pick
//! it up again later.

pub mod error;
pub mod validation;

use std::path::PathBuf;

use log::{info, warn};

pub use error::IntakeError;
pub use validation::{AcceptedFile, UploadValidator, ValidationError};

use crate::config::UploadConfig;
use crate::db::{document_repo, Database};
use crate::document::{Document, DocumentOperation, DocumentStatus, TransitionError};
use crate::queue::{JobPayload, JobStore};

/// A file already written to storage, waiting to become a document.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub user_id: String,
    pub filename: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub mime_type: Option<String>,
    pub profile: Option<String>,
    pub batch_id: Option<String>,
}

impl UploadRequest {
    pub fn new(user_id: &str, filename: &str, file_path: PathBuf, file_size: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            file_path,
            file_size,
            mime_type: None,
            profile: None,
            batch_id: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_string());
        self
    }
}

#[derive(Clone)]
pub struct Intake {
    db: Database,
    store: JobStore,
    validator: UploadValidator,
}

impl Intake {
    pub fn new(db: Database, store: JobStore, config: &UploadConfig) -> Self {
        Self {
            db,
            store,
            validator: UploadValidator::new(config),
        }
    }

    pub fn validator(&self) -> &UploadValidator {
        &self.validator
    }

    /// Validates and records an upload, then enqueues its job.
    ///
    /// Returns the stored document. A rejected upload creates nothing.
    pub fn upload(&self, request: UploadRequest) -> Result<Document, IntakeError> {
        let accepted = self.validator.validate(
            &request.filename,
            request.file_size,
            request.mime_type.as_deref(),
        )?;

        let mut doc = Document::new(
            &request.user_id,
            &accepted.filename,
            request.file_path,
            &accepted.mime_type,
            request.file_size,
        )
        .with_profile(request.profile.as_deref());
        if let Some(batch_id) = request.batch_id.as_deref() {
            doc = doc.with_batch(batch_id);
        }
        document_repo::insert(&self.db, &doc)?;
        info!("Accepted upload {} as document {}", doc.filename, doc.id);

        self.enqueue(&doc)?;
        Ok(document_repo::get(&self.db, &doc.id)?)
    }

    /// Retries the enqueue of a document left in `uploaded`.
    pub fn enqueue_existing(&self, document_id: &str) -> Result<Document, IntakeError> {
        let doc = self.guarded(document_id, DocumentOperation::RetryEnqueue)?;
        self.enqueue(&doc)?;
        Ok(document_repo::get(&self.db, document_id)?)
    }

    /// Starts a fresh job for a `failed` document.
    pub fn resubmit(&self, document_id: &str) -> Result<Document, IntakeError> {
        let doc = self.guarded(document_id, DocumentOperation::Resubmit)?;
        info!("Resubmitting failed document {}", document_id);
        self.enqueue(&doc)?;
        Ok(document_repo::get(&self.db, document_id)?)
    }

    fn guarded(&self, document_id: &str, operation: DocumentOperation) -> Result<Document, IntakeError> {
        let doc = document_repo::get(&self.db, document_id)?;
        doc.check(operation).map_err(|denial| IntakeError::InvalidState {
            document_id: doc.id.clone(),
            status: doc.status,
            denial,
        })?;
        Ok(doc)
    }

    fn enqueue(&self, doc: &Document) -> Result<(), IntakeError> {
        let payload = JobPayload {
            document_id: doc.id.clone(),
            user_id: doc.user_id.clone(),
            file_path: doc.file_path.clone(),
            filename: doc.filename.clone(),
            mime_type: doc.mime_type.clone(),
            profile: doc.profile.clone(),
        };
        let job_id = self
            .store
            .enqueue(&doc.id, &payload)
            .map_err(|source| {
                warn!("Failed to enqueue document {}: {}", doc.id, source);
                IntakeError::QueueUnavailable {
                    document_id: doc.id.clone(),
                    source,
                }
            })?;

        match document_repo::mark_queued(&self.db, &doc.id, &job_id) {
            Ok(()) => Ok(()),
            // A worker claimed the job first and already moved the document on.
            Err(TransitionError::InvalidTransition { from, .. })
                if matches!(from, DocumentStatus::Queued | DocumentStatus::Processing | DocumentStatus::Processed) =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
