//! HTTP transport seam below the extraction client.
//!
//! [`ExtractionClient`](super::ExtractionClient) owns retries and decoding;
//! a [`Transport`] performs exactly one request and reports what came back.

use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};

use super::ExtractionError;
use crate::config::ExtractionConfig;

/// Request body variants the extraction service accepts.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Multipart upload under the form field `file`.
    File {
        filename: String,
        bytes: Vec<u8>,
        mime_type: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl ServiceRequest {
    pub fn new(method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// `path?k=v&…`, used as the endpoint label in logs and errors.
    pub fn endpoint(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single HTTP exchange with the extraction service.
///
/// Implementations return `Ok` for every response the service produced,
/// whatever its status, and `Err` only when no response arrived.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, ExtractionError>;
}

/// Blocking reqwest transport used in production.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl ReqwestTransport {
    pub fn new(
        config: &ExtractionConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn map_error(endpoint: String, e: reqwest::Error) -> ExtractionError {
        if e.is_timeout() {
            ExtractionError::Timeout { endpoint }
        } else {
            ExtractionError::Transport {
                endpoint,
                message: e.to_string(),
            }
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, ExtractionError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .query(&request.query)
            .timeout(request.timeout);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::File {
                filename,
                bytes,
                mime_type,
            } => {
                let part = reqwest::blocking::multipart::Part::bytes(bytes.clone())
                    .file_name(filename.clone())
                    .mime_str(mime_type)
                    .map_err(|e| ExtractionError::InvalidConfig(e.to_string()))?;
                builder.multipart(reqwest::blocking::multipart::Form::new().part("file", part))
            }
        };

        let response = builder
            .send()
            .map_err(|e| Self::map_error(request.endpoint(), e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| Self::map_error(request.endpoint(), e))?;

        Ok(ServiceResponse {
            status,
            body: body.to_vec(),
        })
    }
}
