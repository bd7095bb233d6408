//! Human-in-the-loop corrections, rollback and the audit trail.
//!
//! The extraction service owns the authoritative correction history; the
//! local document keeps a mirror of its latest result and an append-only
//! audit log of what changed here.

pub mod error;
pub mod queue;
pub mod vendor;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

pub use error::ReviewError;
pub use queue::{ReviewItem, LOW_CONFIDENCE_THRESHOLD};
pub use vendor::canonical_vendor_id;

use crate::db::audit_repo::{self, AuditAction, AuditEntry, NewAuditEntry};
use crate::db::{document_repo, Database};
use crate::document::{
    line_items, totals, Denial, Document, DocumentOperation, DocumentStatus, ExtractedData,
    CORRECTABLE_FIELDS, TOTAL_INPUT_FIELDS,
};
use crate::extraction::{ExtractionService, PromoteResponse, RemoteAuditLog};
use crate::pipeline::transform_result;

/// Processed documents scanned when building the review queue.
const REVIEW_SCAN_LIMIT: u64 = 10_000;

pub const DEFAULT_USER: &str = "system";

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRequest {
    pub deltas: BTreeMap<String, Value>,
    pub user_id: String,
    pub reason: Option<String>,
    pub auto_promote: bool,
}

impl CorrectionRequest {
    pub fn new(deltas: BTreeMap<String, Value>) -> Self {
        Self {
            deltas,
            user_id: DEFAULT_USER.to_string(),
            reason: None,
            auto_promote: false,
        }
    }

    pub fn by(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_auto_promote(mut self, auto_promote: bool) -> Self {
        self.auto_promote = auto_promote;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Promotion {
    Promoted { canonical_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub document: Document,
    /// User-corrected fields whose value changed.
    pub changed_fields: Vec<String>,
    /// Derived fields moved by recomputation.
    pub recomputed_fields: Vec<String>,
    pub correction_time: Option<f64>,
    pub learning_artifacts: Option<Value>,
    pub promotion: Option<Promotion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackOutcome {
    pub document: Document,
    pub rolled_back: bool,
}

#[derive(Clone)]
pub struct ReviewService {
    db: Database,
    service: Arc<dyn ExtractionService>,
}

impl ReviewService {
    pub fn new(db: Database, service: Arc<dyn ExtractionService>) -> Self {
        Self { db, service }
    }

    fn guarded(&self, document_id: &str, operation: DocumentOperation) -> Result<(Document, String), ReviewError> {
        let doc = document_repo::get(&self.db, document_id)?;
        match doc.check(operation) {
            Ok(()) => {}
            Err(Denial::NotSubmitted) => return Err(ReviewError::NotSubmitted(doc.id)),
            Err(Denial::WrongStatus) => {
                return Err(ReviewError::InvalidState {
                    document_id: doc.id,
                    status: doc.status,
                })
            }
        }
        let external_job_id = doc
            .external_job_id
            .clone()
            .ok_or_else(|| ReviewError::NotSubmitted(doc.id.clone()))?;
        Ok((doc, external_job_id))
    }

    /// Applies user corrections to a processed or failed document.
    ///
    /// The corrected copy has its line items normalized and derived totals
    /// recomputed before it is sent to the service; the service's result
    /// then replaces the local mirror.
    pub fn apply_corrections(
        &self,
        document_id: &str,
        request: CorrectionRequest,
    ) -> Result<CorrectionOutcome, ReviewError> {
        if let Some(field) = request
            .deltas
            .keys()
            .find(|f| !CORRECTABLE_FIELDS.contains(&f.as_str()))
        {
            return Err(ReviewError::UnknownField(field.clone()));
        }
        let (doc, external_job_id) = self.guarded(document_id, DocumentOperation::ApplyCorrections)?;
        let before = doc.extracted.clone().unwrap_or_default();

        let mut corrected = apply_deltas(&before, &request.deltas)?;
        corrected.line_items = line_items::normalize(std::mem::take(&mut corrected.line_items));
        let touches_totals = request
            .deltas
            .keys()
            .any(|f| TOTAL_INPUT_FIELDS.contains(&f.as_str()));
        let recomputed = if touches_totals {
            totals::recompute(&mut corrected)
        } else {
            Vec::new()
        };

        let mut outgoing = Map::new();
        let mut fields: Vec<&str> = request.deltas.keys().map(String::as_str).collect();
        fields.extend(recomputed.iter().map(|r| r.field));
        for field in fields {
            outgoing.insert(
                field.to_string(),
                corrected.field_value(field).unwrap_or(Value::Null),
            );
        }

        let response = self.service.apply_corrections(
            &external_job_id,
            &outgoing,
            &request.user_id,
            request.auto_promote,
        )?;
        let mut mirrored = transform_result(response.result).map_err(ReviewError::MalformedResult)?;
        if touches_totals {
            totals::recompute(&mut mirrored);
        }
        mirrored.is_duplicate = before.is_duplicate;
        mirrored.refresh_validation_flags();
        document_repo::update_extracted(&self.db, document_id, &mirrored)?;

        let mut entries = Vec::new();
        let mut changed_fields = Vec::new();
        for field in request.deltas.keys() {
            let old = before.field_value(field);
            let new = mirrored.field_value(field);
            if old != new {
                changed_fields.push(field.clone());
                entries.push(
                    NewAuditEntry::field(AuditAction::Correction, field, old, new, &request.user_id)
                        .with_reason(request.reason.as_deref()),
                );
            }
        }
        let mut recomputed_fields = Vec::new();
        for field in recomputed.iter().filter(|r| !request.deltas.contains_key(r.field)) {
            recomputed_fields.push(field.field.to_string());
            entries.push(
                NewAuditEntry::field(
                    AuditAction::Recompute,
                    field.field,
                    before.field_value(field.field),
                    mirrored.field_value(field.field),
                    &request.user_id,
                )
                .with_reason(request.reason.as_deref()),
            );
        }
        audit_repo::append_all(&self.db, document_id, &entries)?;
        info!(
            "Applied {} corrections to document {} ({} recomputed)",
            changed_fields.len(),
            document_id,
            recomputed_fields.len()
        );

        let promotion = match (request.auto_promote, mirrored.vendor_name.as_deref()) {
            (true, Some(vendor)) if !vendor.trim().is_empty() => {
                Some(match self.promote_vendor(vendor, None) {
                    Ok(promoted) => Promotion::Promoted {
                        canonical_id: promoted.canonical_id,
                    },
                    Err(e) => {
                        warn!("Vendor promotion for document {} failed: {}", document_id, e);
                        Promotion::Failed {
                            error: e.to_string(),
                        }
                    }
                })
            }
            _ => None,
        };

        Ok(CorrectionOutcome {
            document: document_repo::get(&self.db, document_id)?,
            changed_fields,
            recomputed_fields,
            correction_time: response.correction_time,
            learning_artifacts: response.learning_artifacts,
            promotion,
        })
    }

    /// Reverts the document to its pre-correction result.
    pub fn rollback(&self, document_id: &str, user_id: &str) -> Result<RollbackOutcome, ReviewError> {
        let (doc, external_job_id) = self.guarded(document_id, DocumentOperation::Rollback)?;
        let response = self.service.rollback(&external_job_id, user_id)?;
        if !response.rolled_back {
            info!("Extraction service had nothing to roll back for {}", document_id);
            return Ok(RollbackOutcome {
                document: doc,
                rolled_back: false,
            });
        }

        let previous = doc.extracted.clone().unwrap_or_default();
        let mut reverted = transform_result(response.result).map_err(ReviewError::MalformedResult)?;
        reverted.is_duplicate = previous.is_duplicate;
        document_repo::update_extracted(&self.db, document_id, &reverted)?;

        audit_repo::append(
            &self.db,
            document_id,
            &NewAuditEntry {
                action: AuditAction::Rollback,
                field_name: None,
                old_value: serde_json::to_value(&previous).ok(),
                new_value: serde_json::to_value(&reverted).ok(),
                user_id: user_id.to_string(),
                reason: None,
            },
        )?;
        info!("Rolled back corrections on document {}", document_id);

        Ok(RollbackOutcome {
            document: document_repo::get(&self.db, document_id)?,
            rolled_back: true,
        })
    }

    /// Local audit entries in append order.
    pub fn audit_log(&self, document_id: &str) -> Result<Vec<AuditEntry>, ReviewError> {
        document_repo::get(&self.db, document_id)?;
        Ok(audit_repo::list_for_document(&self.db, document_id)?)
    }

    /// The extraction service's own correction trail.
    pub fn remote_audit_log(&self, document_id: &str) -> Result<RemoteAuditLog, ReviewError> {
        let (_, external_job_id) = self.guarded(document_id, DocumentOperation::RemoteRead)?;
        Ok(self.service.audit_log(&external_job_id)?)
    }

    /// Processed documents needing attention, most urgent first.
    pub fn review_queue(&self, limit: usize) -> Result<Vec<ReviewItem>, ReviewError> {
        let docs = document_repo::list_by_status(&self.db, DocumentStatus::Processed, REVIEW_SCAN_LIMIT)?;
        let mut items: Vec<ReviewItem> = docs.iter().filter_map(ReviewItem::from_document).collect();
        queue::rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    /// Promotes a vendor into the service's canonical vendor list.
    pub fn promote_vendor(
        &self,
        vendor_name: &str,
        canonical_id: Option<&str>,
    ) -> Result<PromoteResponse, ReviewError> {
        let vendor_name = vendor_name.trim();
        let canonical_id = match canonical_id.map(str::trim).filter(|c| !c.is_empty()) {
            Some(id) => id.to_string(),
            None => canonical_vendor_id(vendor_name),
        };
        if canonical_id.is_empty() {
            return Err(ReviewError::InvalidVendor(vendor_name.to_string()));
        }
        let response = self.service.promote_vendor(vendor_name, Some(&canonical_id))?;
        info!("Promoted vendor '{}' as {}", vendor_name, response.canonical_id);
        Ok(response)
    }
}

/// Overlays `deltas` on a copy of `data`.
fn apply_deltas(data: &ExtractedData, deltas: &BTreeMap<String, Value>) -> Result<ExtractedData, ReviewError> {
    let mut value = serde_json::to_value(data).map_err(ReviewError::InvalidValue)?;
    if let Value::Object(map) = &mut value {
        for (field, delta) in deltas {
            map.insert(field.clone(), delta.clone());
        }
    }
    ExtractedData::from_value(value).map_err(ReviewError::InvalidValue)
}
