//! Error types for rollout-ecs

use thiserror::Error;

/// Errors raised by an orchestration service backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service answered the call with an error
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    /// The response did not carry a field the flow depends on
    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// Client construction failed
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceError {
    /// Build a rejection without an error code.
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Rejected {
            operation,
            code: None,
            message: message.into(),
        }
    }

    /// Service-side error code, when one was returned.
    pub fn code(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Errors raised while resolving deploy credentials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// A required value is absent from its source
    #[error("Credential {name} not found in {source_kind}")]
    Missing {
        name: &'static str,
        source_kind: String,
    },

    /// A value resolved to an empty string
    #[error("Credential {0} is empty")]
    Empty(&'static str),

    /// A secret reference could not be read
    #[error("Failed to read secret reference {reference}: {message}")]
    Unreadable { reference: String, message: String },
}
