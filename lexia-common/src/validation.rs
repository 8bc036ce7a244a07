//! Configuration validation for Lexia services.
//!
//! Catches misconfiguration at startup instead of on the first webhook.

use thiserror::Error;

use crate::config::{AgentConfig, AuthConfig, Config, DedupConfig, ObservabilityConfig, ServerConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port} for {field}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.server.validate(),
            self.auth.validate(),
            self.agent.validate(),
            self.dedup.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        Ok(())
    }
}

impl Validate for AuthConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.shared_secret.as_deref() {
            Some(secret) if secret.trim().is_empty() => Err(ValidationError::InvalidValue {
                field: "auth.shared_secret".into(),
                reason: "must not be blank when set; omit it to disable auth".into(),
            }),
            _ => Ok(()),
        }
    }
}

impl Validate for AgentConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(ref endpoint) = self.reply_endpoint {
            let parsed = url::Url::parse(endpoint).map_err(|e| ValidationError::InvalidValue {
                field: "agent.reply_endpoint".into(),
                reason: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ValidationError::InvalidValue {
                    field: "agent.reply_endpoint".into(),
                    reason: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }
        if self.reply_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "agent.reply_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for DedupConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.retention_secs == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "dedup.retention_secs".into(),
                reason: "must be greater than 0; omit it for unbounded retention".into(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "dedup.sweep_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected 'json' or 'pretty', got '{}'", self.log_format),
            });
        }
        Ok(())
    }
}
