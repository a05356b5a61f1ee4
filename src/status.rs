//! RPC status codes and the error value carried through handler chains.
//!
//! Whatever a middleware, method implementation or error handler fails with
//! is a [`Status`]. It is handed to error handlers and finally to the
//! transport verbatim; only [`Status::normalized`] fills in the default
//! `INTERNAL` / `"Internal Server Error"` shape when code or message are
//! missing.

use std::fmt;

use crate::error::CondorError;
use crate::metadata::Metadata;

/// Message used when an error carries no message of its own.
pub const DEFAULT_ERROR_MESSAGE: &str = "Internal Server Error";

/// gRPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Map a numeric code; values outside the gRPC range become `Unknown`.
    pub fn from_i32(value: i32) -> Code {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Numeric value on the wire.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Canonical upper-case name, e.g. `"NOT_FOUND"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error outcome of a call: code, message, optional details and trailing
/// metadata.
#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    message: String,
    details: Option<String>,
    metadata: Option<Metadata>,
    /// Set only on the status raised when error handlers consumed an error
    /// without sending a response.
    no_response: bool,
    /// Stamped when the status escapes the error handlers of a chain.
    /// Not part of equality.
    escape_id: Option<u64>,
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && self.details == other.details
            && self.metadata == other.metadata
            && self.no_response == other.no_response
    }
}

impl Status {
    /// Create a status with the given code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            metadata: None,
            no_response: false,
            escape_id: None,
        }
    }

    /// The status raised when error handlers consumed an error without
    /// sending a response.
    pub fn no_response_after_error_handled() -> Self {
        Self {
            no_response: true,
            ..Self::internal(CondorError::NoResponseAfterErrorHandled.to_string())
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    /// Attach free-form details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach trailing metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[inline]
    pub fn code(&self) -> Code {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Fill in the defaults a transport expects: `OK` is not an error code
    /// and becomes `INTERNAL`, an empty message becomes
    /// [`DEFAULT_ERROR_MESSAGE`].
    pub fn normalized(mut self) -> Self {
        if self.code == Code::Ok {
            self.code = Code::Internal;
        }
        if self.message.is_empty() {
            self.message = match &self.details {
                Some(details) if !details.is_empty() => details.clone(),
                _ => DEFAULT_ERROR_MESSAGE.to_string(),
            };
        }
        self
    }

    /// True for the status produced when error handlers consumed an error
    /// without sending a response.
    pub fn is_no_response_after_error_handled(&self) -> bool {
        self.no_response
    }

    pub(crate) fn escape_id(&self) -> Option<u64> {
        self.escape_id
    }

    pub(crate) fn with_escape_id(mut self, id: u64) -> Self {
        self.escape_id = Some(id);
        self
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<Code> for Status {
    fn from(code: Code) -> Self {
        Status::new(code, "")
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status::new(Code::from_i32(code), "")
    }
}

impl From<&str> for Status {
    fn from(message: &str) -> Self {
        Status::internal(message)
    }
}

impl From<String> for Status {
    fn from(message: String) -> Self {
        Status::internal(message)
    }
}

impl From<CondorError> for Status {
    fn from(err: CondorError) -> Self {
        if matches!(err, CondorError::NoResponseAfterErrorHandled) {
            return Status::no_response_after_error_handled();
        }
        let code = match &err {
            CondorError::Validation { .. } => Code::InvalidArgument,
            CondorError::StreamClosed => Code::Cancelled,
            CondorError::Transport(_) => Code::Unavailable,
            CondorError::Json(_) => Code::InvalidArgument,
            _ => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Status::internal(err.to_string())
    }
}

impl From<serde_json::Error> for Status {
    fn from(err: serde_json::Error) -> Self {
        Status::invalid_argument(err.to_string())
    }
}
