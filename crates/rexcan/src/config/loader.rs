use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Overrides the extraction service base URL.
pub const ENV_EXTRACTION_URL: &str = "REXCAN_EXTRACTION_URL";
/// Overrides the database path.
pub const ENV_DATABASE_PATH: &str = "REXCAN_DATABASE_PATH";

/// Reads, validates and deserializes a config file, then applies
/// environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Applies `REXCAN_EXTRACTION_URL` and `REXCAN_DATABASE_PATH` when set.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var(ENV_EXTRACTION_URL) {
        if !url.trim().is_empty() {
            log::debug!("Extraction URL overridden from {}", ENV_EXTRACTION_URL);
            config.extraction.base_url = url.trim().to_string();
        }
    }
    if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
        if !path.trim().is_empty() {
            config.database_path = Some(PathBuf::from(path.trim()));
        }
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if let Err(e) = reqwest::Url::parse(&config.extraction.base_url) {
        return Err(ConfigError::Validation {
            message: format!(
                "Invalid extraction base_url '{}': {}",
                config.extraction.base_url, e
            ),
        });
    }

    if config.queue.concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "queue.concurrency must be at least 1".to_string(),
        });
    }
    if config.queue.rate_limit_per_sec == 0 {
        return Err(ConfigError::Validation {
            message: "queue.rate_limit_per_sec must be at least 1".to_string(),
        });
    }
    if config.queue.attempts == 0 || config.extraction.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "attempt budgets must be at least 1".to_string(),
        });
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level '{}': {}", config.logging.level, e),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let config = load_config_from_str(
            r#"{"version": "1.0", "extraction": {"base_url": "http://localhost:8000"}}"#,
        )
        .unwrap();

        assert_eq!(config.extraction.timeout_secs, 120);
        assert_eq!(config.extraction.max_attempts, 3);
        assert_eq!(config.queue.concurrency, 5);
        assert_eq!(config.queue.rate_limit_per_sec, 10);
        assert_eq!(config.queue.completed_retention_secs, 86_400);
        assert_eq!(config.queue.failed_retention_secs, 604_800);
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.upload.allowed_extensions.len(), 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_full_config() {
        let config = load_config_from_str(
            r#"
            {
                "version": "1.0",
                "database_path": "/var/lib/rexcan/rexcan.db",
                "extraction": {
                    "base_url": "https://extract.internal",
                    "timeout_secs": 60,
                    "max_attempts": 2,
                    "api_key_env": "EXTRACTION_API_KEY"
                },
                "queue": {"concurrency": 8, "rate_limit_per_sec": 4},
                "upload": {"max_file_size": 1024, "allowed_extensions": ["pdf"]},
                "logging": {"level": "rexcan=debug,info", "json": true}
            }
            "#,
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/rexcan/rexcan.db"))
        );
        assert_eq!(config.extraction.timeout_secs, 60);
        assert_eq!(
            config.extraction.api_key_env.as_deref(),
            Some("EXTRACTION_API_KEY")
        );
        assert_eq!(config.queue.concurrency, 8);
        assert_eq!(config.queue.attempts, 3);
        assert_eq!(config.upload.allowed_extensions, vec!["pdf".to_string()]);
        assert!(config.logging.json);
    }

    #[test]
    fn test_schema_rejects_unknown_fields_and_bad_types() {
        let result = load_config_from_str(
            r#"{"version": "1.0", "extraction": {"base_url": "http://x"}, "workers": 3}"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));

        let result = load_config_from_str(
            r#"{"version": "1.0", "extraction": {"base_url": "http://x"}, "queue": {"concurrency": 0}}"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));

        let result = load_config_from_str(r#"{"version": "1.0", "extraction": {}}"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let result = load_config_from_str(
            r#"{"version": "2.0", "extraction": {"base_url": "http://localhost"}}"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            load_config_from_str("{not json"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/rexcan.json"),
            Err(ConfigError::ReadFile { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides_applied_by_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "1.0", "extraction": {{"base_url": "http://localhost:8000"}}}}"#
        )
        .unwrap();

        std::env::set_var(ENV_EXTRACTION_URL, "http://extraction:9000");
        std::env::set_var(ENV_DATABASE_PATH, "/tmp/override.db");
        let config = load_config(file.path());
        std::env::remove_var(ENV_EXTRACTION_URL);
        std::env::remove_var(ENV_DATABASE_PATH);

        let config = config.unwrap();
        assert_eq!(config.extraction.base_url, "http://extraction:9000");
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/override.db")));
    }

    #[test]
    #[serial]
    fn test_resolved_database_path_defaults_to_home() {
        std::env::remove_var(ENV_DATABASE_PATH);
        let config = load_config_from_str(
            r#"{"version": "1.0", "extraction": {"base_url": "http://localhost"}}"#,
        )
        .unwrap();
        let path = config.resolved_database_path().unwrap();
        assert!(path.ends_with("rexcan.db"));
    }
}
