//! Infrastructure-level errors (wraps application errors)

use std::time::Duration;

use thiserror::Error;

use crate::application::ApplicationError;

/// Infrastructure errors wrap application errors and add I/O-level concerns.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("{0}")]
    Application(#[from] ApplicationError),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http client setup failed: {message}")]
    Http { message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },
}

impl InfraError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for infrastructure layer operations.
pub type InfraResult<T> = Result<T, InfraError>;

/// Failure of a single call to a remote collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Rate limited; `retry_after` is the server's hint when it sent one
    #[error("rate limited")]
    Throttled { retry_after: Option<Duration> },

    /// Server error, timeout or connection failure
    #[error("transient failure: {0}")]
    Transient(String),

    /// Request refused; retrying the same request will not help
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response arrived but could not be understood
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Throttling and transient failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Transient(_))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for calls to remote collaborators.
pub type RemoteResult<T> = Result<T, RemoteError>;
