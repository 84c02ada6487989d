//! Error types for the SendGrid provider.

use thiserror::Error;

/// Errors that can occur while executing provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The resource specification failed schema validation. No remote call
    /// was made.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable description of the failure.
        message: String,
        /// The offending attribute path, if known.
        field: Option<String>,
    },

    /// The remote entity does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A create was attempted for an identity that already has a remote
    /// entity.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Another operation on the same logical identity is in flight.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A retryable network or server error (connection failure, 408, 429,
    /// 5xx).
    #[error("Transient error: {0}")]
    Transient(String),

    /// The remote API rejected the request with a non-retryable 4xx.
    #[error("SendGrid API error (status {status}): {message}")]
    RemoteRejected {
        /// HTTP status code returned by the API.
        status: u16,
        /// First error message from the response body.
        message: String,
        /// The field the API blamed, if reported.
        field: Option<String>,
    },

    /// The provider is misconfigured (e.g. missing API key).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is not in the registry.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The current state does not permit the requested operation.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal provider error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Build a validation error without an attribute path.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Build a validation error for a specific attribute.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Whether the CRUD orchestrator may retry the failed call.
    ///
    /// Only transient network and server failures are retryable; validation
    /// and remote 4xx rejections surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the error means the remote entity is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable machine-readable code, used on the wire and in the operation
    /// ledger.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Conflict(_) => "conflict",
            Self::Transient(_) => "transient",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::Configuration(_) => "configuration",
            Self::UnknownResource(_) => "unknown_resource",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// The attribute the error points at, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::RemoteRejected { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Reqwest surfaces connection, DNS and timeout failures here; status
        // errors are mapped by the client from the response body.
        Self::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("key_123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: key_123");

        let err = ProviderError::validation_field("name is required", "name");
        assert_eq!(format!("{}", err), "Validation error: name is required");

        let err = ProviderError::UnknownResource("custom_resource".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: custom_resource");

        let err = ProviderError::RemoteRejected {
            status: 400,
            message: "invalid scopes".to_string(),
            field: Some("scopes".to_string()),
        };
        assert_eq!(
            format!("{}", err),
            "SendGrid API error (status 400): invalid scopes"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Transient("connection reset".to_string()).is_retryable());

        assert!(!ProviderError::validation("bad").is_retryable());
        assert!(!ProviderError::NotFound("x".to_string()).is_retryable());
        assert!(!ProviderError::AlreadyExists("x".to_string()).is_retryable());
        assert!(!ProviderError::Conflict("x".to_string()).is_retryable());
        assert!(!ProviderError::RemoteRejected {
            status: 400,
            message: "bad".to_string(),
            field: None,
        }
        .is_retryable());
    }

    #[test]
    fn test_code_and_field() {
        assert_eq!(ProviderError::validation("bad").code(), "validation");
        assert_eq!(ProviderError::Conflict("x".to_string()).code(), "conflict");

        let err = ProviderError::RemoteRejected {
            status: 400,
            message: "invalid scopes".to_string(),
            field: Some("scopes".to_string()),
        };
        assert_eq!(err.code(), "remote_rejected");
        assert_eq!(err.field(), Some("scopes"));
        assert_eq!(ProviderError::NotFound("x".to_string()).field(), None);
    }

    #[test]
    fn test_not_found_helper() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        assert!(!ProviderError::Conflict("x".to_string()).is_not_found());
    }
}
