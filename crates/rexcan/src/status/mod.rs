//! Read-only status, log and export queries for pollers.
//!
//! Whether to keep polling is derived from the document's status or from
//! the service reporting the job as gone, never from local flags.

pub mod error;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

pub use error::StatusError;

use crate::broadcast::{JobProgressEvent, LogEvent};
use crate::db::{document_repo, Database};
use crate::document::{Document, DocumentStatus};
use crate::extraction::{ExportFormat, ExtractionService, RemoteStatusReport};
use crate::queue::{JobStore, QueueCounts};
use crate::worker::Broadcasters;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub document_id: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub external_job_id: Option<String>,
    pub batch_id: Option<String>,
    pub processed_at: Option<String>,
    pub logs: Vec<LogEvent>,
    pub has_result: bool,
    /// Pollers stop once this is set.
    pub terminal: bool,
}

impl StatusView {
    fn new(doc: Document, logs: Vec<LogEvent>) -> Self {
        Self {
            terminal: doc.status.is_terminal(),
            has_result: doc.extracted.is_some(),
            document_id: doc.id,
            filename: doc.filename,
            status: doc.status,
            error_message: doc.error_message,
            external_job_id: doc.external_job_id,
            batch_id: doc.batch_id,
            processed_at: doc.processed_at,
            logs,
        }
    }
}

/// What the extraction service knows about a document's job.
#[derive(Debug, Clone)]
pub enum RemoteStatus {
    /// The document never reached the service.
    NotSubmitted,
    /// The service no longer knows the job.
    Expired,
    Reported(RemoteStatusReport),
}

impl RemoteStatus {
    pub fn is_gone(&self) -> bool {
        matches!(self, RemoteStatus::Expired)
    }
}

#[derive(Clone)]
pub struct StatusService {
    db: Database,
    store: JobStore,
    service: Arc<dyn ExtractionService>,
    broadcasters: Broadcasters,
}

impl StatusService {
    pub fn new(
        db: Database,
        store: JobStore,
        service: Arc<dyn ExtractionService>,
        broadcasters: Broadcasters,
    ) -> Self {
        Self {
            db,
            store,
            service,
            broadcasters,
        }
    }

    fn document(&self, document_id: &str) -> Result<Document, StatusError> {
        document_repo::find_by_id(&self.db, document_id)?
            .ok_or_else(|| StatusError::NotFound(document_id.to_string()))
    }

    fn external_job_id(&self, document_id: &str) -> Result<Option<String>, StatusError> {
        Ok(self.document(document_id)?.external_job_id)
    }

    pub fn document_status(&self, document_id: &str) -> Result<StatusView, StatusError> {
        let doc = self.document(document_id)?;
        let logs = self.broadcasters.logs.recent(document_id);
        Ok(StatusView::new(doc, logs))
    }

    pub fn remote_status(&self, document_id: &str) -> Result<RemoteStatus, StatusError> {
        let Some(external_job_id) = self.external_job_id(document_id)? else {
            return Ok(RemoteStatus::NotSubmitted);
        };
        match self.service.status(&external_job_id) {
            Ok(report) => Ok(RemoteStatus::Reported(report)),
            Err(e) if e.is_not_found() => Ok(RemoteStatus::Expired),
            Err(e) => Err(e.into()),
        }
    }

    pub fn queue_overview(&self) -> Result<QueueCounts, StatusError> {
        Ok(self.store.counts()?)
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        self.broadcasters.logs.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcasters.progress.subscribe()
    }

    /// Exported result as produced by the service, CSV or JSON.
    pub fn export(&self, document_id: &str, format: &ExportFormat) -> Result<Vec<u8>, StatusError> {
        let external_job_id = self
            .external_job_id(document_id)?
            .ok_or_else(|| StatusError::NotSubmitted(document_id.to_string()))?;
        Ok(self.service.export(&external_job_id, format)?)
    }

    pub fn service_healthy(&self) -> bool {
        match self.service.health() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Extraction service health check failed: {}", e);
                false
            }
        }
    }
}
