//! Cloud provider error types

use infraflow_core::{GraphError, StackError};
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    /// Error returned by the provider API, surfaced verbatim
    #[error("Provider error on '{resource}': {message}")]
    Provider { resource: String, message: String },

    /// Transient provider failure (throttling, conflicts in flight)
    #[error("Provider temporarily unavailable for '{resource}': {message}")]
    Throttled { resource: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Outputs of '{0}' are already bound for this apply")]
    OutputAlreadyBound(String),

    #[error("Output '{reference}' required by '{resource}' is not bound yet")]
    UnresolvedOutput { resource: String, reference: String },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn provider(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(
            CloudError::Throttled {
                resource: "ip".into(),
                message: "429".into()
            }
            .is_retryable()
        );
        assert!(CloudError::Timeout("create".into()).is_retryable());
        assert!(!CloudError::provider("ip", "quota exceeded").is_retryable());
        assert!(!CloudError::OutputAlreadyBound("ip".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_is_verbatim() {
        let err = CloudError::provider("myappgw", "SubnetIsFull: no address left");
        assert_eq!(
            err.to_string(),
            "Provider error on 'myappgw': SubnetIsFull: no address left"
        );
    }
}
