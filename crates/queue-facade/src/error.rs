//! Error types for queue operations.
//!
//! The remote client and the service wrapper share [`QueueError`], so errors
//! produced by the queueing service reach the caller exactly as the client
//! reported them.

use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("service is not running")]
    ServiceNotRunning,

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("queue {queue_url} not found")]
    QueueNotFound { queue_url: String },

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("request throttled: {code} - {message}")]
    Throttled { code: String, message: String },

    #[error("provider error: {code} - {message}")]
    Provider { code: String, message: String },

    #[error("invalid request: {code} - {message}")]
    InvalidRequest { code: String, message: String },

    #[error("serialization failed: {message}")]
    Serialization { message: String },
}

impl QueueError {
    /// Check if error is transient and a caller may retry the operation.
    ///
    /// The service never retries on its own; this is purely advisory.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ServiceNotRunning => false,
            Self::InvalidConfiguration { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::Metrics(_) => false,
            Self::Authentication { .. } => false,
            Self::Connection { .. } => true,
            Self::Throttled { .. } => true,
            Self::Provider { .. } => true,
            Self::InvalidRequest { .. } => false,
            Self::Serialization { .. } => false,
        }
    }

    /// Whether the error was raised locally rather than by the remote service.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotRunning
                | Self::InvalidConfiguration { .. }
                | Self::QueueNotFound { .. }
                | Self::Metrics(_)
        )
    }

    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
