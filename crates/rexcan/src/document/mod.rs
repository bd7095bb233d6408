//! Documents, their lifecycle, and the extracted invoice payload.
//!
//! Persistence lives in [`crate::db::document_repo`]; every status write
//! there is a compare-and-set against the statuses allowed to precede it.

pub mod data;
pub mod error;
pub mod line_items;
pub mod status;
pub mod totals;

use std::path::PathBuf;

pub use data::{ExtractedData, LineItem, CORRECTABLE_FIELDS, TOTAL_INPUT_FIELDS};
pub use error::TransitionError;
pub use status::{check_operation, Denial, DocumentOperation, DocumentStatus};

/// One uploaded file and everything the pipeline knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub batch_id: Option<String>,
    pub filename: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    pub file_size: u64,
    pub profile: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub queue_job_id: Option<String>,
    pub external_job_id: Option<String>,
    pub extracted: Option<ExtractedData>,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    /// A fresh document in `uploaded` with a random UUID.
    pub fn new(
        user_id: &str,
        filename: &str,
        file_path: PathBuf,
        mime_type: &str,
        file_size: u64,
    ) -> Self {
        let now = crate::db::now_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            batch_id: None,
            filename: filename.to_string(),
            file_path,
            mime_type: mime_type.to_string(),
            file_size,
            profile: None,
            status: DocumentStatus::Uploaded,
            error_message: None,
            queue_job_id: None,
            external_job_id: None,
            extracted: None,
            processed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_batch(mut self, batch_id: &str) -> Self {
        self.batch_id = Some(batch_id.to_string());
        self
    }

    pub fn with_profile(mut self, profile: Option<&str>) -> Self {
        self.profile = profile.map(|p| p.to_string());
        self
    }

    pub fn has_external_id(&self) -> bool {
        self.external_job_id.is_some()
    }

    /// Checks the legality table for `operation` against this document.
    pub fn check(&self, operation: DocumentOperation) -> Result<(), Denial> {
        check_operation(self.status, self.has_external_id(), operation)
    }
}
