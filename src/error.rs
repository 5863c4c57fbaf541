//! Error types for the degradation proxy

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for the degradation proxy
pub type Result<T> = std::result::Result<T, Error>;

/// Degradation proxy errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller passed something unusable (e.g. no target callback)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Awaiting the dispatched call exceeded the service timeout
    #[error("Call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Failure injected on purpose by a degradation plan
    #[error("Injected failure: {0}")]
    Injected(InjectedError),

    /// The target operation itself failed
    #[error("Target error: {0}")]
    Target(String),

    /// Worker task was lost before producing a result
    #[error("Worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Handler is shutting down
    #[error("Handler shutdown")]
    Shutdown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an injected failure of the given kind
    pub fn injected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Injected(InjectedError::new(kind, message))
    }

    /// Whether this error was produced deliberately by a degradation plan
    #[must_use]
    pub fn is_injected(&self) -> bool {
        matches!(self, Self::Injected(_))
    }

    /// Whether this error is the handler's await timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A simulated failure chosen from the configured error kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedError {
    /// Registry tag the error was built from (e.g. `"io"`)
    pub kind: String,
    /// Human-readable message, empty for parameterless construction
    pub message: String,
}

impl InjectedError {
    /// Create a new injected error
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Generic failure used when a plan fails without a chosen error
    #[must_use]
    pub fn fallback() -> Self {
        Self::new("degraded", "Call failed by degradation plan")
    }
}

impl fmt::Display for InjectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for InjectedError {}
