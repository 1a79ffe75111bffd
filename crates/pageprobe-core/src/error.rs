//! Unified error types for pageprobe

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for all page verification operations
#[derive(Error, Debug)]
pub enum ProbeError {
    // Session lifecycle
    #[error("Session error: {0}")]
    Session(String),

    #[error("Browser error: {0}")]
    Browser(String),

    // Page loading
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("Scenario deadline exceeded")]
    DeadlineExceeded,

    // Checks
    #[error("Check '{check}' failed to run: {reason}")]
    Check { check: String, reason: String },

    // Reporting
    #[error("Failed to write report {}: {reason}", path.display())]
    ReportWrite { path: PathBuf, reason: String },

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    /// Shorthand for a navigation failure
    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a timed out operation
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// True for bounded-wait failures.
    ///
    /// A check whose element wait runs out of budget reports `fail`, not `error`,
    /// so the runner needs to tell these apart from genuine faults.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ElementNotFound { .. })
    }
}

/// Result type alias using ProbeError
pub type Result<T> = std::result::Result<T, ProbeError>;
