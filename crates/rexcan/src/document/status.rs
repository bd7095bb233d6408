use serde::{Deserialize, Serialize};

/// Lifecycle status of a document.
///
/// `uploaded → queued → processing → {processed | failed}`, with
/// re-submission from `failed` back to `queued`. No transition skips a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Queued,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        DocumentStatus::Uploaded,
        DocumentStatus::Queued,
        DocumentStatus::Processing,
        DocumentStatus::Processed,
        DocumentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Whether `self → next` is one of the legal transitions.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Uploaded, DocumentStatus::Queued)
                | (DocumentStatus::Queued, DocumentStatus::Processing)
                | (DocumentStatus::Processing, DocumentStatus::Processed)
                | (DocumentStatus::Processing, DocumentStatus::Failed)
                | (DocumentStatus::Failed, DocumentStatus::Queued)
        )
    }

    /// Statuses from which `next` may be entered.
    pub fn predecessors(next: DocumentStatus) -> Vec<DocumentStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// `processed` and `failed` end a job attempt. Pollers stop here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations gated on a document's status and external job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOperation {
    /// Retry a failed enqueue for a document still in `uploaded`.
    RetryEnqueue,
    /// Start a new attempt for a `failed` document.
    Resubmit,
    ApplyCorrections,
    Rollback,
    /// Audit log, export and remote status reads.
    RemoteRead,
}

/// Why an operation is not allowed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The document has never been submitted to the extraction service.
    NotSubmitted,
    /// The document's status does not allow the operation.
    WrongStatus,
}

/// The legality table over `(status, external id present)`.
pub fn check_operation(
    status: DocumentStatus,
    has_external_id: bool,
    operation: DocumentOperation,
) -> Result<(), Denial> {
    match operation {
        DocumentOperation::RetryEnqueue => {
            if status == DocumentStatus::Uploaded {
                Ok(())
            } else {
                Err(Denial::WrongStatus)
            }
        }
        DocumentOperation::Resubmit => {
            if status == DocumentStatus::Failed {
                Ok(())
            } else {
                Err(Denial::WrongStatus)
            }
        }
        DocumentOperation::ApplyCorrections | DocumentOperation::Rollback => {
            if !has_external_id {
                Err(Denial::NotSubmitted)
            } else if !status.is_terminal() {
                Err(Denial::WrongStatus)
            } else {
                Ok(())
            }
        }
        DocumentOperation::RemoteRead => {
            if has_external_id {
                Ok(())
            } else {
                Err(Denial::NotSubmitted)
            }
        }
    }
}
