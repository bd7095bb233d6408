use crate::document::ExtractedData;
use crate::queue::ClaimedJob;

/// How step 1 found the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Moved to `processing` by this delivery.
    Started,
    /// Already `processing` from an earlier delivery.
    Resumed,
    /// Already `processed`; the job completes without work.
    AlreadyProcessed,
}

pub struct PipelineContext {
    // Input
    pub job: ClaimedJob,

    // Step 1 result
    pub entry: Option<Entry>,

    // Step 2 result; `submitted` is false when an earlier delivery's
    // identifier was reused
    pub external_job_id: Option<String>,
    pub submitted: bool,

    // Steps 3-5 result
    pub extracted: Option<ExtractedData>,
    pub duplicate_of: Option<String>,
}

impl PipelineContext {
    pub fn new(job: ClaimedJob) -> Self {
        Self {
            job,
            entry: None,
            external_job_id: None,
            submitted: false,
            extracted: None,
            duplicate_of: None,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.job.payload.document_id
    }
}
