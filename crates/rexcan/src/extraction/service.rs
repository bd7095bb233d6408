//! The extraction service's operations, as consumed by the pipeline.

use std::path::Path;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::transport::RequestBody;
use super::{ExtractionClient, ExtractionError};

/// `POST /upload` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

/// `POST /review/{job_id}/apply` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub job_id: String,
    pub result: Value,
    #[serde(default)]
    pub audit_delta: Option<Value>,
    #[serde(default)]
    pub correction_time: Option<f64>,
    #[serde(default)]
    pub learning_artifacts: Option<Value>,
}

/// `POST /review/{job_id}/rollback` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub job_id: String,
    pub result: Value,
    #[serde(default)]
    pub rolled_back: bool,
}

/// `GET /audit/{job_id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAuditLog {
    pub job_id: String,
    #[serde(default)]
    pub audit_entries: Vec<Value>,
    #[serde(default)]
    pub total_entries: u64,
}

/// `GET /status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStatusReport {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub has_result: bool,
    #[serde(default)]
    pub needs_human_review: bool,
}

/// `POST /vendor/promote` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteResponse {
    pub canonical_id: String,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Export formats offered by the service. CSV carries the target ERP
/// flavour (`quickbooks`, `sap`, `oracle`, `xero`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ExportFormat {
    Csv { erp_type: String },
    Json,
}

/// Operations of the external extraction service.
///
/// Every method blocks for the duration of the call, retries included.
pub trait ExtractionService: Send + Sync {
    /// Uploads the stored file and returns the service's job identifier.
    fn submit(
        &self,
        file_path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, ExtractionError>;

    /// Runs extraction for a previously submitted job.
    fn process(&self, external_job_id: &str, profile: Option<&str>)
        -> Result<Value, ExtractionError>;

    fn apply_corrections(
        &self,
        external_job_id: &str,
        deltas: &Map<String, Value>,
        user_id: &str,
        auto_promote: bool,
    ) -> Result<ApplyResponse, ExtractionError>;

    fn rollback(&self, external_job_id: &str, user_id: &str)
        -> Result<RollbackResponse, ExtractionError>;

    fn audit_log(&self, external_job_id: &str) -> Result<RemoteAuditLog, ExtractionError>;

    fn status(&self, external_job_id: &str) -> Result<RemoteStatusReport, ExtractionError>;

    fn promote_vendor(
        &self,
        vendor_name: &str,
        canonical_id: Option<&str>,
    ) -> Result<PromoteResponse, ExtractionError>;

    fn export(&self, external_job_id: &str, format: &ExportFormat)
        -> Result<Vec<u8>, ExtractionError>;

    fn health(&self) -> Result<(), ExtractionError>;
}

/// [`ExtractionService`] over HTTP using an [`ExtractionClient`].
#[derive(Clone)]
pub struct HttpExtractionService {
    client: ExtractionClient,
}

impl HttpExtractionService {
    pub fn new(client: ExtractionClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ExtractionClient {
        &self.client
    }
}

impl ExtractionService for HttpExtractionService {
    fn submit(
        &self,
        file_path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, ExtractionError> {
        let bytes = std::fs::read(file_path).map_err(|e| ExtractionError::Io {
            path: file_path.to_path_buf(),
            source: e,
        })?;
        let request = self.client.request(Method::POST, "/upload").body(RequestBody::File {
            filename: filename.to_string(),
            bytes,
            mime_type: mime_type.to_string(),
        });
        self.client.call(&request)
    }

    fn process(
        &self,
        external_job_id: &str,
        profile: Option<&str>,
    ) -> Result<Value, ExtractionError> {
        let mut request = self
            .client
            .request(Method::POST, "/process")
            .query("job_id", external_job_id);
        if let Some(profile) = profile {
            request = request.query("profile", profile);
        }
        self.client.call(&request)
    }

    fn apply_corrections(
        &self,
        external_job_id: &str,
        deltas: &Map<String, Value>,
        user_id: &str,
        auto_promote: bool,
    ) -> Result<ApplyResponse, ExtractionError> {
        let request = self
            .client
            .request(Method::POST, format!("/review/{}/apply", external_job_id))
            .query("user_id", user_id)
            .query("auto_promote", auto_promote.to_string())
            .body(RequestBody::Json(Value::Object(deltas.clone())));
        self.client.call(&request)
    }

    fn rollback(
        &self,
        external_job_id: &str,
        user_id: &str,
    ) -> Result<RollbackResponse, ExtractionError> {
        let request = self
            .client
            .request(Method::POST, format!("/review/{}/rollback", external_job_id))
            .query("user_id", user_id);
        self.client.call(&request)
    }

    fn audit_log(&self, external_job_id: &str) -> Result<RemoteAuditLog, ExtractionError> {
        let request = self
            .client
            .request(Method::GET, format!("/audit/{}", external_job_id));
        self.client.call(&request)
    }

    fn status(&self, external_job_id: &str) -> Result<RemoteStatusReport, ExtractionError> {
        let request = self
            .client
            .request(Method::GET, "/status")
            .query("job_id", external_job_id);
        self.client.call(&request)
    }

    fn promote_vendor(
        &self,
        vendor_name: &str,
        canonical_id: Option<&str>,
    ) -> Result<PromoteResponse, ExtractionError> {
        let mut request = self
            .client
            .request(Method::POST, "/vendor/promote")
            .query("vendor_name", vendor_name);
        if let Some(id) = canonical_id {
            request = request.query("canonical_id", id);
        }
        self.client.call(&request)
    }

    fn export(
        &self,
        external_job_id: &str,
        format: &ExportFormat,
    ) -> Result<Vec<u8>, ExtractionError> {
        let request = match format {
            ExportFormat::Csv { erp_type } => self
                .client
                .request(Method::GET, "/export/csv")
                .query("job_id", external_job_id)
                .query("erp_type", erp_type.as_str()),
            ExportFormat::Json => self
                .client
                .request(Method::GET, "/export/json")
                .query("job_id", external_job_id),
        };
        self.client.fetch_blob(&request)
    }

    fn health(&self) -> Result<(), ExtractionError> {
        let request = self.client.request(Method::GET, "/health");
        let _: Value = self.client.call(&request)?;
        Ok(())
    }
}
