use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{KraangError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_analysis(config, &mut errors);
        Self::validate_sessions(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KraangError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.pool_size == 0 {
            errors.push(ValidationError::new(
                "storage.pool_size",
                "Pool size must be greater than 0",
            ));
        }

        if let Some(path) = &config.storage.db_path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "storage.db_path",
                    "Database path cannot be empty when set",
                ));
            }
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if search.default_limit == 0 {
            errors.push(ValidationError::new(
                "search.default_limit",
                "Default limit must be greater than 0",
            ));
        }

        if search.max_limit < search.default_limit {
            errors.push(ValidationError::new(
                "search.max_limit",
                format!(
                    "Max limit ({}) must be at least the default limit ({})",
                    search.max_limit, search.default_limit
                ),
            ));
        }

        if search.snippet_length < 20 {
            errors.push(ValidationError::new(
                "search.snippet_length",
                format!("Snippet length too small: {}", search.snippet_length),
            ));
        }
    }

    fn validate_analysis(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.analysis.stale_days < 0 {
            errors.push(ValidationError::new(
                "analysis.stale_days",
                "Stale threshold cannot be negative",
            ));
        }

        if config.analysis.recent_days <= 0 {
            errors.push(ValidationError::new(
                "analysis.recent_days",
                "Recent window must be at least one day",
            ));
        }
    }

    fn validate_sessions(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.sessions.summary_max_chars == 0 {
            errors.push(ValidationError::new(
                "sessions.summary_max_chars",
                "Summary length must be greater than 0",
            ));
        }

        if config.sessions.transcript_max_chars == 0 {
            errors.push(ValidationError::new(
                "sessions.transcript_max_chars",
                "Transcript turn length must be greater than 0",
            ));
        }
    }
}
