//! Error types module
//!
//! All errors are unified under the `AppError` enum which can represent
//! database, provider, configuration and state-machine errors. Provider
//! failures keep their structured code + message so they can be written
//! verbatim into connection logs and transfer notes.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the
//! `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    /// Structured error surfaced by the key provider (protocol/transport layer).
    #[error("Provider error {code}: {message}")]
    Provider { code: String, message: String },

    /// Illegal state-machine transition. The entity is left unchanged.
    #[error("Invalid transition '{action}' from state '{from}'")]
    InvalidTransition { from: String, action: String },

    /// Missing or inconsistent setup (unconfirmed connection, unregistered
    /// processor key, absent passphrase). Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Privileged operation attempted without elevated rights.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn invalid_transition(from: impl ToString, action: impl ToString) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            action: action.to_string(),
        }
    }

    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Get the error type name for detailed error reporting.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Provider { .. } => "Provider",
            AppError::InvalidTransition { .. } => "InvalidTransition",
            AppError::Configuration(_) => "Configuration",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Whether the operation may be attempted again without operator action.
    /// Configuration and transition errors are permanent until fixed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Provider { .. }
                | AppError::Internal(_)
                | AppError::InternalWithSource { .. }
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = AppError::invalid_transition("draft", "confirm_verified");
        assert_eq!(
            err.to_string(),
            "Invalid transition 'confirm_verified' from state 'draft'"
        );
        assert_eq!(err.error_type(), "InvalidTransition");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_provider_error_keeps_code_and_message() {
        let err = AppError::provider("EBICS_AUTHENTICATION_FAILED", "bank rejected signature");
        assert!(err.to_string().contains("EBICS_AUTHENTICATION_FAILED"));
        assert!(err.to_string().contains("bank rejected signature"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_configuration_error_not_recoverable() {
        let err = AppError::Configuration("no processor registered for 'camt.053'".into());
        assert_eq!(err.error_type(), "Configuration");
        assert!(!err.is_recoverable());
    }
}
