//! Error types for condor.

use thiserror::Error;

/// Main error type for registration, lifecycle and transport operations.
///
/// Errors raised by user handlers are not represented here; those travel
/// through the chain as [`Status`](crate::Status) values.
#[derive(Debug, Error)]
pub enum CondorError {
    /// Bad registration input (proto path, package/service name, scope).
    #[error("Cannot {action}: {reason}")]
    Validation {
        /// Operation that rejected the input, e.g. `"add service"`.
        action: &'static str,
        /// What was invalid.
        reason: String,
    },

    /// A mutating operation was attempted after the server started.
    #[error("Cannot {0}: Server has already started")]
    AlreadyStarted(&'static str),

    /// A lifecycle operation that needs a running server.
    #[error("Cannot {0}: Server has not started")]
    NotStarted(&'static str),

    /// A completion was resolved or rejected a second time.
    #[error("Cannot resolve/reject a response already resolved/rejected")]
    AlreadyResolved,

    /// A completion was inspected before it settled.
    #[error("Response has not been resolved/rejected yet")]
    NotDone,

    /// The error-handler chain consumed an error without sending a response.
    #[error("No response sent after error was handled")]
    NoResponseAfterErrorHandled,

    /// The server could not be started.
    #[error("Cannot start server: {0}")]
    Start(String),

    /// Error reported by the underlying transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Write or end on a stream that is closed (or not a stream).
    #[error("Stream closed")]
    StreamClosed,

    /// I/O error while reading proto or credential files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A proto scan pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl CondorError {
    /// Shorthand for a [`CondorError::Validation`].
    pub fn validation(action: &'static str, reason: impl Into<String>) -> Self {
        CondorError::Validation {
            action,
            reason: reason.into(),
        }
    }
}

/// Result type alias using CondorError.
pub type Result<T> = std::result::Result<T, CondorError>;
