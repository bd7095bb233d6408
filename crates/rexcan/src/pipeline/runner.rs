use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info_span, warn};

use crate::broadcast::job_progress::JobPhase;
use crate::db::{document_repo, Database};
use crate::document::{line_items, totals, DocumentStatus, ExtractedData, TransitionError};
use crate::extraction::ExtractionService;
use crate::sanitize;

use super::context::{Entry, PipelineContext};
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};

/// Status re-reads allowed while racing a producer in step 1.
const MAX_ENTRY_ROUNDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Processed {
        external_job_id: String,
        is_duplicate: bool,
    },
    /// The document was already `processed`; nothing was done.
    AlreadyProcessed,
}

/// Decodes an extraction result into the document's payload: line items
/// normalized, validation flags and the arithmetic check recomputed.
pub fn transform_result(raw: Value) -> Result<ExtractedData, serde_json::Error> {
    let mut data = ExtractedData::from_value(raw)?;
    data.line_items = line_items::normalize(std::mem::take(&mut data.line_items));
    data.refresh_validation_flags();
    data.arithmetic_mismatch = data.arithmetic_mismatch || totals::has_arithmetic_mismatch(&data);
    Ok(data)
}

/// Drives one job through the extraction protocol.
pub struct Pipeline {
    db: Database,
    service: Arc<dyn ExtractionService>,
}

impl Pipeline {
    pub fn new(db: Database, service: Arc<dyn ExtractionService>) -> Self {
        Self { db, service }
    }

    /// Runs the protocol for the claimed job in `ctx`.
    ///
    /// Any error aborts this delivery only; the caller reports it to the
    /// job store and decides the document's fate from the outcome.
    pub fn run(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutcome, PipelineError> {
        let filename = sanitize::redact_path(&ctx.job.payload.file_path);
        let _pipeline_span = info_span!("pipeline",
            document_id = %ctx.job.payload.document_id,
            job_id = %ctx.job.id,
            attempt = ctx.job.attempt,
            filename = %filename,
        )
        .entered();

        let result = self.run_steps(ctx, progress);
        if let Err(ref e) = result {
            warn!(
                "Job {} attempt {}/{} failed: {}",
                ctx.job.id, ctx.job.attempt, ctx.job.max_attempts, e
            );
        }
        result
    }

    fn run_steps(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutcome, PipelineError> {
        // Step 1: Enter processing
        {
            let _step = info_span!("begin").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Claimed,
                message: format!("Picked up (attempt {})", ctx.job.attempt),
            });
            let entry = self.step_begin(ctx)?;
            ctx.entry = Some(entry);
            if entry == Entry::AlreadyProcessed {
                debug!("Document {} already processed, nothing to do", ctx.document_id());
                return Ok(PipelineOutcome::AlreadyProcessed);
            }
        }

        // Step 2: Submit unless an earlier delivery already did
        let external_job_id = {
            let _step = info_span!("submit").entered();
            self.step_submit(ctx, progress)?
        };

        // Step 3: Extract
        let raw = {
            let _step = info_span!("process").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Extracting,
                message: "Running extraction".to_string(),
            });
            self.service
                .process(&external_job_id, ctx.job.payload.profile.as_deref())?
        };

        // Step 4: Transform
        let mut data = {
            let _step = info_span!("transform").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Transforming,
                message: "Normalizing line items and validation flags".to_string(),
            });
            transform_result(raw).map_err(PipelineError::MalformedResult)?
        };

        // Step 5: Duplicate cross-check
        {
            let _step = info_span!("dedupe").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::DuplicateCheck,
                message: "Checking for duplicates".to_string(),
            });
            self.step_dedupe(ctx, &mut data)?;
        }

        // Step 6: Persist and transition atomically
        {
            let _step = info_span!("persist").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Persisting,
                message: "Saving extracted data".to_string(),
            });
            document_repo::mark_processed(&self.db, ctx.document_id(), &data)?;
        }

        let is_duplicate = data.is_duplicate;
        ctx.extracted = Some(data);
        progress.report(ProgressEvent::Completed {
            external_job_id: external_job_id.clone(),
            is_duplicate,
        });

        Ok(PipelineOutcome::Processed {
            external_job_id,
            is_duplicate,
        })
    }

    /// Moves the document into `processing`, applying the re-entry rules.
    ///
    /// A document still `uploaded` (the producer has not recorded the
    /// enqueue yet) or `failed` (re-submission in flight) is first moved
    /// to `queued` here, the same legal transition the producer makes.
    fn step_begin(&self, ctx: &PipelineContext) -> Result<Entry, PipelineError> {
        let id = ctx.document_id();
        for _ in 0..MAX_ENTRY_ROUNDS {
            let doc = document_repo::get(&self.db, id)?;
            let attempt = match doc.status {
                DocumentStatus::Uploaded | DocumentStatus::Failed => {
                    document_repo::mark_queued(&self.db, id, &ctx.job.id)
                }
                DocumentStatus::Queued => match document_repo::mark_processing(&self.db, id) {
                    Ok(()) => return Ok(Entry::Started),
                    Err(e) => Err(e),
                },
                DocumentStatus::Processing => {
                    debug!("Document {} already processing, resuming", id);
                    return Ok(Entry::Resumed);
                }
                DocumentStatus::Processed => return Ok(Entry::AlreadyProcessed),
            };
            match attempt {
                Ok(()) | Err(TransitionError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PipelineError::Contended(id.to_string()))
    }

    fn step_submit(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<String, PipelineError> {
        let id = ctx.document_id().to_string();
        let doc = document_repo::get(&self.db, &id)?;

        if let Some(existing) = doc.external_job_id {
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Submitting,
                message: "Already submitted, reusing extraction job".to_string(),
            });
            debug!("Document {} reuses external job {}", id, existing);
            ctx.external_job_id = Some(existing.clone());
            return Ok(existing);
        }

        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Submitting,
            message: format!("Uploading {}", ctx.job.payload.filename),
        });
        let payload = &ctx.job.payload;
        let upload = self
            .service
            .submit(&payload.file_path, &payload.filename, &payload.mime_type)?;

        let external_job_id = if document_repo::set_external_job_id(&self.db, &id, &upload.job_id)? {
            upload.job_id
        } else {
            // Another writer got there first; theirs is authoritative.
            let doc = document_repo::get(&self.db, &id)?;
            doc.external_job_id.unwrap_or(upload.job_id)
        };

        ctx.external_job_id = Some(external_job_id.clone());
        ctx.submitted = true;
        Ok(external_job_id)
    }

    fn step_dedupe(
        &self,
        ctx: &mut PipelineContext,
        data: &mut ExtractedData,
    ) -> Result<(), PipelineError> {
        let Some(hash) = data.dedupe_hash.as_deref() else {
            return Ok(());
        };
        if let Some(original) =
            document_repo::find_processed_duplicate(&self.db, hash, ctx.document_id())?
        {
            debug!(
                "Document {} duplicates processed document {}",
                ctx.document_id(),
                original
            );
            data.is_duplicate = true;
            ctx.duplicate_of = Some(original);
        }
        Ok(())
    }
}
