/// Unified error handling for gredis
///
/// Every fallible router, command and batch operation returns
/// [`GredisResult`]. Store failures are carried verbatim from the Redis
/// client library; nothing in this crate terminates the process.

use std::fmt;
use thiserror::Error;

/// Main error type for gredis operations
#[derive(Debug, Error)]
pub enum GredisError {
    /// Configuration errors (bad or duplicate connection, invalid file, unknown command kind)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No backend handle can serve the request
    #[error("No active connection: {reason}")]
    NoActiveConnection { reason: String },

    /// Network, protocol or server failure reported by the store client
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Some commands of a pipeline failed while others succeeded
    #[error("Pipeline partially failed: {failed} of {total} commands failed")]
    BatchPartialFailure {
        failed: usize,
        total: usize,
        /// (submission index, server message)
        failures: Vec<(usize, String)>,
    },

    /// The handle was closed by a previous teardown
    #[error("Connection already closed: {name}")]
    AlreadyClosed { name: String },

    /// One or more handles failed to close cleanly
    #[error("Failed to close {} connection(s): {}", .failures.len(), format_failures(.failures))]
    CloseFailed { failures: Vec<(String, String)> },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for gredis operations
pub type GredisResult<T> = Result<T, GredisError>;

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, reason)| format!("{}: {}", name, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience methods for creating specific error types
impl GredisError {
    /// Create a configuration validation error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GredisError::Config(ConfigError::ValidationError(message.into()))
    }

    /// Create a no-active-connection error
    pub fn no_active_connection<S: Into<String>>(reason: S) -> Self {
        GredisError::NoActiveConnection {
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        GredisError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create an already-closed error
    pub fn already_closed<S: Into<String>>(name: S) -> Self {
        GredisError::AlreadyClosed { name: name.into() }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            GredisError::Timeout { .. } => true,
            GredisError::BatchPartialFailure { .. } => true,
            GredisError::Store(err) => {
                err.is_io_error() || err.is_timeout() || err.is_connection_dropped()
            }
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GredisError::Config(_) => ErrorSeverity::Critical,
            GredisError::NoActiveConnection { .. } => ErrorSeverity::Error,
            GredisError::Store(_) => ErrorSeverity::Error,
            GredisError::Timeout { .. } => ErrorSeverity::Warning,
            GredisError::BatchPartialFailure { .. } => ErrorSeverity::Warning,
            GredisError::CloseFailed { .. } => ErrorSeverity::Warning,
            GredisError::AlreadyClosed { .. } => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
