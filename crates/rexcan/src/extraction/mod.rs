//! Extraction service integration.
//!
//! [`ExtractionService`] is the contract the pipeline and the review
//! workflow consume. [`HttpExtractionService`] implements it over the
//! retrying [`ExtractionClient`], which sits on a swappable [`Transport`].

pub mod client;
pub mod error;
pub mod service;
pub mod transport;

pub use client::{ClientOptions, ExponentialSchedule, ExtractionClient};
pub use error::ExtractionError;
pub use service::{
    ApplyResponse, ExportFormat, ExtractionService, HttpExtractionService, PromoteResponse,
    RemoteAuditLog, RemoteStatusReport, RollbackResponse, UploadResponse,
};
pub use transport::{RequestBody, ReqwestTransport, ServiceRequest, ServiceResponse, Transport};
