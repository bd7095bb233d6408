//! Retrying JSON client for the extraction service.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use reqwest::Method;
use secrecy::SecretString;
use serde::de::DeserializeOwned;

use super::transport::{ReqwestTransport, ServiceRequest, ServiceResponse, Transport};
use super::ExtractionError;
use crate::config::ExtractionConfig;
use crate::queue::backoff_delay;
use crate::sanitize::{truncate_body, MAX_ERROR_BODY_LEN};

/// Exact exponential delay schedule: `base · 2^(n-1)` after the n-th
/// failed attempt, and no further delay once `max_attempts` calls were made.
///
/// Unlike `backoff::ExponentialBackoff` there is no jitter, so the
/// schedule is deterministic (2s, 4s for the defaults).
#[derive(Debug, Clone)]
pub struct ExponentialSchedule {
    base: Duration,
    max_attempts: u32,
    failures: u32,
}

impl ExponentialSchedule {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            failures: 0,
        }
    }
}

impl Backoff for ExponentialSchedule {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.max_attempts {
            return None;
        }
        Some(backoff_delay(self.base, self.failures))
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&ExtractionConfig> for ClientOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Extraction service client: one [`Transport`] plus the retry policy.
///
/// 404 is never retried. Timeouts, connection failures and every other
/// non-2xx status are retried up to `max_attempts`; a malformed 2xx body
/// fails the call without a retry.
#[derive(Clone)]
pub struct ExtractionClient {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
}

impl ExtractionClient {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self { transport, options }
    }

    /// Builds a reqwest-backed client. The API key, when configured, is
    /// read from the environment variable named by `api_key_env`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let api_key = match &config.api_key_env {
            Some(name) => {
                let value = std::env::var(name).map_err(|_| {
                    ExtractionError::InvalidConfig(format!(
                        "environment variable '{}' is not set",
                        name
                    ))
                })?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        let transport = ReqwestTransport::new(config, api_key)?;
        Ok(Self::new(Arc::new(transport), ClientOptions::from(config)))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// A request on `path` carrying the default per-call timeout.
    pub fn request(&self, method: Method, path: impl Into<String>) -> ServiceRequest {
        ServiceRequest::new(method, path, self.options.timeout)
    }

    /// Sends `request` with retries and decodes the JSON response.
    pub fn call<T: DeserializeOwned>(&self, request: &ServiceRequest) -> Result<T, ExtractionError> {
        let body = self.send_with_retry(request)?;
        serde_json::from_slice(&body).map_err(|source| ExtractionError::Decode {
            endpoint: request.endpoint(),
            source,
        })
    }

    /// Binary side channel: the raw response bytes, which must be non-empty.
    pub fn fetch_blob(&self, request: &ServiceRequest) -> Result<Vec<u8>, ExtractionError> {
        let body = self.send_with_retry(request)?;
        if body.is_empty() {
            return Err(ExtractionError::EmptyBody {
                endpoint: request.endpoint(),
            });
        }
        Ok(body)
    }

    fn send_with_retry(&self, request: &ServiceRequest) -> Result<Vec<u8>, ExtractionError> {
        let endpoint = request.endpoint();
        let max_attempts = self.options.max_attempts;
        let mut attempt = 0u32;

        let operation = || {
            attempt += 1;
            self.transport
                .send(request)
                .and_then(|response| classify(&endpoint, response))
                .map_err(|err| {
                    log::warn!(
                        "Extraction call {} failed (status {}, attempt {}/{}): {}",
                        endpoint,
                        err.status()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "none".to_string()),
                        attempt,
                        max_attempts,
                        err
                    );
                    if err.is_retryable() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
        };

        let notify = |_err: ExtractionError, delay: Duration| {
            log::debug!("Retrying {} in {:?}", endpoint, delay);
        };

        let schedule = ExponentialSchedule::new(self.options.backoff_base, max_attempts);
        backoff::retry_notify(schedule, operation, notify).map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

fn classify(endpoint: &str, response: ServiceResponse) -> Result<Vec<u8>, ExtractionError> {
    if response.is_success() {
        return Ok(response.body);
    }
    if response.status == 404 {
        return Err(ExtractionError::NotFound {
            endpoint: endpoint.to_string(),
        });
    }
    Err(ExtractionError::Status {
        endpoint: endpoint.to_string(),
        status: response.status,
        body: truncate_body(&response.body, MAX_ERROR_BODY_LEN),
    })
}
