//! Result and error types for Verifica.

use thiserror::Error;

/// Result type for Verifica operations
pub type VerificaResult<T> = Result<T, VerificaError>;

/// Errors that can occur while driving a workflow
#[derive(Debug, Error)]
pub enum VerificaError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// The browser itself became unusable (crash, closed connection).
    ///
    /// This is the only error class that aborts a run.
    #[error("Browser driver fault: {message}")]
    DriverFault {
        /// Error message
        message: String,
    },

    /// A single driver call failed but the browser is still usable
    #[error("Driver call failed: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// A required UI element never resolved
    #[error("No candidate resolved for {target} (tried: {})", attempted.join(", "))]
    LocatorNotFound {
        /// Logical target name
        target: String,
        /// Candidates that were tried, in order
        attempted: Vec<String>,
    },

    /// Navigation, action or settle wait exceeded its bound
    #[error("{operation} timed out after {ms}ms")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A different actor tried to authenticate in a session that was not cleared
    #[error("Session still bound to {bound}; refusing to authenticate {requested}")]
    SessionLeak {
        /// Actor currently bound
        bound: String,
        /// Actor that tried to bind
        requested: String,
    },

    /// Operation on a session that was already closed
    #[error("Session is closed")]
    SessionClosed,

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Invalid run configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Workflow definition is inconsistent
    #[error("Invalid workflow: {message}")]
    InvalidWorkflow {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl VerificaError {
    /// Create a recoverable driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a fatal driver fault
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::DriverFault {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            ms,
        }
    }

    /// Whether the error means the browser can no longer be used
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DriverFault { .. } | Self::SessionClosed)
    }
}
