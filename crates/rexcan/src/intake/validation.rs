//! Upload checks applied before a document is created.

use std::path::Path;

use thiserror::Error;

use crate::config::UploadConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is empty")]
    Empty,

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid file type: '{extension}' (allowed: {allowed})")]
    Extension { extension: String, allowed: String },

    #[error("Invalid MIME type: {0}")]
    MimeType(String),

    #[error("Invalid filename: '{0}'")]
    Filename(String),
}

/// A file that passed validation, with its display name stripped of any
/// directory part and its MIME type resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedFile {
    pub filename: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
    allowed_mime_types: Vec<String>,
}

impl UploadValidator {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    /// Checks size, then extension, then MIME type.
    ///
    /// A missing or generic (`application/octet-stream`) MIME type is
    /// guessed from the extension.
    pub fn validate(
        &self,
        filename: &str,
        file_size: u64,
        mime_type: Option<&str>,
    ) -> Result<AcceptedFile, ValidationError> {
        let display_name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ValidationError::Filename(filename.to_string()))?;

        if file_size == 0 {
            return Err(ValidationError::Empty);
        }
        if file_size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size: file_size,
                max: self.max_file_size,
            });
        }

        let extension = Path::new(&display_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::Extension {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        let mime_type = match mime_type.map(|m| m.trim().to_lowercase()) {
            Some(m) if !m.is_empty() && m != "application/octet-stream" => m,
            _ => mime_guess::from_path(&display_name)
                .first_raw()
                .map(|m| m.to_string())
                .ok_or_else(|| ValidationError::MimeType("unknown".to_string()))?,
        };
        if !self.allowed_mime_types.contains(&mime_type) {
            return Err(ValidationError::MimeType(mime_type));
        }

        Ok(AcceptedFile {
            filename: display_name,
            mime_type,
        })
    }
}
