use std::path::PathBuf;

use thiserror::Error;

/// Errors raised talking to the extraction service.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("{endpoint}: not found")]
    NotFound { endpoint: String },

    #[error("{endpoint}: HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: request timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint}: connection failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint}: malformed response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{endpoint}: empty response body")]
    EmptyBody { endpoint: String },

    #[error("Failed to read upload '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid extraction client configuration: {0}")]
    InvalidConfig(String),
}

impl ExtractionError {
    /// Whether another attempt of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractionError::Status { .. }
                | ExtractionError::Timeout { .. }
                | ExtractionError::Transport { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExtractionError::NotFound { .. })
    }

    /// HTTP status of the failed call, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExtractionError::NotFound { .. } => Some(404),
            ExtractionError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let endpoint = "/process".to_string();
        assert!(ExtractionError::Status {
            endpoint: endpoint.clone(),
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(ExtractionError::Timeout {
            endpoint: endpoint.clone()
        }
        .is_retryable());
        assert!(!ExtractionError::NotFound {
            endpoint: endpoint.clone()
        }
        .is_retryable());
        assert!(!ExtractionError::EmptyBody { endpoint }.is_retryable());
    }

    #[test]
    fn test_display_carries_endpoint_and_status() {
        let err = ExtractionError::Status {
            endpoint: "/upload".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "/upload: HTTP 500: boom");
        assert_eq!(err.status(), Some(500));
    }
}
