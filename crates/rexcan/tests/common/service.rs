//! Scripted extraction service.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use rexcan::extraction::{
    ApplyResponse, ExportFormat, ExtractionError, ExtractionService, PromoteResponse,
    RemoteAuditLog, RemoteStatusReport, RollbackResponse, UploadResponse,
};

/// A well-formed extraction result: subtotal 13, tax 1, total 14.
pub fn invoice(invoice_id: &str, dedupe_hash: &str) -> Value {
    json!({
        "invoice_id": invoice_id,
        "vendor_name": "Acme Corp",
        "invoice_date": "2024-03-01",
        "currency": "USD",
        "amount_subtotal": 13.0,
        "amount_tax": 1.0,
        "total_amount": 14.0,
        "line_items": [
            {"description": "Widget", "quantity": 2.0, "unit_price": 5.0, "total": 10.0},
            {"description": "Gadget", "quantity": 1.0, "unit_price": 3.0, "total": 3.0}
        ],
        "field_confidences": {"invoice_id": 0.95, "total_amount": 0.9},
        "dedupe_hash": dedupe_hash,
        "timings": {"ocr": 0.4}
    })
}

#[derive(Default)]
struct RemoteJob {
    result: Value,
    snapshot: Option<Value>,
}

/// Answers `/process` from a script of outcomes, then from a default.
///
/// An `Err(status)` entry fails the call with that HTTP status.
pub struct ScriptedService {
    script: Mutex<VecDeque<Result<Value, u16>>>,
    fallback: Mutex<Result<Value, u16>>,
    jobs: Mutex<HashMap<String, RemoteJob>>,
    submits: AtomicUsize,
    processes: AtomicUsize,
}

impl ScriptedService {
    pub fn returning(result: Value) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(result)),
            jobs: Mutex::new(HashMap::new()),
            submits: AtomicUsize::new(0),
            processes: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        let service = Self::returning(Value::Null);
        *service.fallback.lock().unwrap() = Err(status);
        service
    }

    /// Queues outcomes played before the fallback.
    pub fn then(self, outcome: Result<Value, u16>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn set_result(&self, result: Value) {
        *self.fallback.lock().unwrap() = Ok(result);
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn process_count(&self) -> usize {
        self.processes.load(Ordering::SeqCst)
    }

    fn status_error(endpoint: &str, status: u16) -> ExtractionError {
        if status == 404 {
            ExtractionError::NotFound {
                endpoint: endpoint.to_string(),
            }
        } else {
            ExtractionError::Status {
                endpoint: endpoint.to_string(),
                status,
                body: format!("scripted {}", status),
            }
        }
    }

    fn unknown(endpoint: &str) -> ExtractionError {
        ExtractionError::NotFound {
            endpoint: endpoint.to_string(),
        }
    }
}

impl ExtractionService for ScriptedService {
    fn submit(
        &self,
        _file_path: &Path,
        filename: &str,
        _mime_type: &str,
    ) -> Result<UploadResponse, ExtractionError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("ext-{}", n);
        self.jobs
            .lock()
            .unwrap()
            .insert(job_id.clone(), RemoteJob::default());
        Ok(UploadResponse {
            job_id,
            filename: Some(filename.to_string()),
            preview_url: None,
        })
    }

    fn process(&self, external_job_id: &str, _profile: Option<&str>) -> Result<Value, ExtractionError> {
        self.processes.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        let result = next.map_err(|status| Self::status_error("/process", status))?;
        if let Some(job) = self.jobs.lock().unwrap().get_mut(external_job_id) {
            job.result = result.clone();
        }
        Ok(result)
    }

    fn apply_corrections(
        &self,
        external_job_id: &str,
        deltas: &Map<String, Value>,
        _user_id: &str,
        _auto_promote: bool,
    ) -> Result<ApplyResponse, ExtractionError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(external_job_id)
            .ok_or_else(|| Self::unknown("/review/apply"))?;
        if job.snapshot.is_none() {
            job.snapshot = Some(job.result.clone());
        }
        for (field, value) in deltas {
            job.result[field] = value.clone();
        }
        Ok(ApplyResponse {
            job_id: external_job_id.to_string(),
            result: job.result.clone(),
            audit_delta: Some(Value::Object(deltas.clone())),
            correction_time: Some(0.1),
            learning_artifacts: None,
        })
    }

    fn rollback(&self, external_job_id: &str, _user_id: &str) -> Result<RollbackResponse, ExtractionError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(external_job_id)
            .ok_or_else(|| Self::unknown("/review/rollback"))?;
        let Some(snapshot) = job.snapshot.take() else {
            return Ok(RollbackResponse {
                job_id: external_job_id.to_string(),
                result: job.result.clone(),
                rolled_back: false,
            });
        };
        job.result = snapshot;
        Ok(RollbackResponse {
            job_id: external_job_id.to_string(),
            result: job.result.clone(),
            rolled_back: true,
        })
    }

    fn audit_log(&self, external_job_id: &str) -> Result<RemoteAuditLog, ExtractionError> {
        Ok(RemoteAuditLog {
            job_id: external_job_id.to_string(),
            audit_entries: Vec::new(),
            total_entries: 0,
        })
    }

    fn status(&self, external_job_id: &str) -> Result<RemoteStatusReport, ExtractionError> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(external_job_id).ok_or_else(|| Self::unknown("/status"))?;
        Ok(RemoteStatusReport {
            job_id: external_job_id.to_string(),
            status: "processed".to_string(),
            logs: Vec::new(),
            has_result: !job.result.is_null(),
            needs_human_review: false,
        })
    }

    fn promote_vendor(
        &self,
        vendor_name: &str,
        canonical_id: Option<&str>,
    ) -> Result<PromoteResponse, ExtractionError> {
        Ok(PromoteResponse {
            canonical_id: canonical_id.unwrap_or_default().to_string(),
            vendor_name: Some(vendor_name.to_string()),
            message: None,
        })
    }

    fn export(&self, external_job_id: &str, format: &ExportFormat) -> Result<Vec<u8>, ExtractionError> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(external_job_id).ok_or_else(|| Self::unknown("/export"))?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_vec(&job.result).unwrap()),
            ExportFormat::Csv { erp_type } => Ok(format!("erp,{}\n", erp_type).into_bytes()),
        }
    }

    fn health(&self) -> Result<(), ExtractionError> {
        Ok(())
    }
}
