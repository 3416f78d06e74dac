//! Error types for the keyplane reconciliation engine.
//!
//! This module provides the error hierarchy for all stages of a run:
//! template loading and validation, account scope resolution, provider
//! calls, apply orchestration, and report generation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the keyplane engine.
#[derive(Debug, Error)]
pub enum KeyplaneError {
    /// Template-related errors.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Account scope resolution errors.
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Provider call errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Apply orchestration errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Report generation errors.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Template-related errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template file was not found.
    #[error("Template file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The template file could not be parsed.
    #[error("Failed to parse template {path}: {message}")]
    ParseError {
        /// Path to the template file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// The template could not be serialized for writing.
    #[error("Failed to serialize template {identifier}: {message}")]
    SerializeError {
        /// Template identifier.
        identifier: String,
        /// Description of the serialization error.
        message: String,
    },

    /// Validation failed.
    #[error("Template validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An expiry annotation could not be parsed.
    #[error("Invalid expiry date '{value}': {message}")]
    InvalidExpiry {
        /// The unparseable value.
        value: String,
        /// Description of the parse failure.
        message: String,
    },
}

/// Account scope resolution errors.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Two explicitly scoped entries resolve to the same account with
    /// different values.
    #[error("Scope conflict on '{attribute}': account {account} matches more than one explicit entry")]
    Conflict {
        /// The scoped attribute (e.g. "path", "permissions_boundary").
        attribute: String,
        /// The account with overlapping entries.
        account: String,
    },

    /// An account referenced in a scope rule is not configured.
    #[error("Unknown account in scope rule: {account}")]
    UnknownAccount {
        /// The unresolvable account identifier.
        account: String,
    },
}

/// Provider call errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication against the provider failed.
    #[error("Provider authentication failed for account {account}: {message}")]
    AuthenticationFailed {
        /// Account the call was made against.
        account: String,
        /// Description of the auth failure.
        message: String,
    },

    /// The provider throttled the request.
    #[error("Provider throttled request, retry after {retry_after_secs} seconds")]
    Throttled {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error while calling the provider.
    #[error("Network error calling provider: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The provider call timed out.
    #[error("Provider call timed out: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// The provider rejected a mutation.
    #[error("Provider rejected {operation} on {resource}: {message}")]
    MutationRejected {
        /// The rejected operation.
        operation: String,
        /// The target resource.
        resource: String,
        /// Provider-supplied rejection message.
        message: String,
    },

    /// The provider refused to delete a resource with live dependents.
    #[error("Cannot delete {resource}: dependents still attached ({message})")]
    DeleteConflict {
        /// The resource that could not be deleted.
        resource: String,
        /// Provider-supplied conflict message.
        message: String,
    },

    /// Retry attempts were exhausted.
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error observed.
        #[source]
        source: Box<ProviderError>,
    },
}

/// Apply orchestration errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The operator declined the apply confirmation.
    #[error("Apply aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Report generation errors.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report could not be serialized.
    #[error("Failed to serialize change report: {message}")]
    SerializeError {
        /// Description of the serialization error.
        message: String,
    },

    /// The report file could not be written.
    #[error("Failed to write change report to {path}: {message}")]
    WriteError {
        /// Target report path.
        path: PathBuf,
        /// Description of the write failure.
        message: String,
    },
}

/// Result type alias for keyplane operations.
pub type Result<T> = std::result::Result<T, KeyplaneError>;

impl KeyplaneError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    ///
    /// Only transient provider failures are retried; semantic failures
    /// (validation errors, rejected mutations, absence) are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::Throttled { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Provider(ProviderError::Network { .. } | ProviderError::Timeout { .. }) => {
                Some(5)
            }
            _ => None,
        }
    }
}

impl TemplateError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ProviderError {
    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns true if this provider error is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Network { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_is_retryable() {
        let err = KeyplaneError::Provider(ProviderError::Throttled {
            retry_after_secs: 30,
        });
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(30));
    }

    #[test]
    fn test_rejected_mutation_is_not_retryable() {
        let err = KeyplaneError::Provider(ProviderError::MutationRejected {
            operation: String::from("attach_managed_policy"),
            resource: String::from("engineering"),
            message: String::from("policy does not exist"),
        });
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay_secs(), None);
    }

    #[test]
    fn test_validation_error_is_not_retryable() {
        let err = KeyplaneError::Template(TemplateError::validation("too many tags", "tags"));
        assert!(!err.is_retryable());
    }
}
