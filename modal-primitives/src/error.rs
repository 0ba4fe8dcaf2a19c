//! Shared error taxonomy for the tool host.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the tool host.
pub type Result<T> = std::result::Result<T, HostError>;

/// Closed set of error codes the host may emit in an envelope.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Caller supplied an argument that cannot be honored.
    InvalidArgument,
    /// Tool or resource does not exist.
    NotFound,
    /// Access policy forbids the operation.
    PermissionDenied,
    /// Write target exists and overwriting was not requested.
    AlreadyExists,
    /// Payload exceeds the configured byte ceiling.
    PayloadTooLarge,
    /// Selected model cannot consume or produce the requested format.
    UnsupportedFormat,
    /// Selected model cannot perform the requested transformation.
    UnsupportedTransformation,
    /// Structured output did not conform to the declared schema.
    SchemaValidationFailed,
    /// A step inside a chain failed.
    ChainStepFailed,
    /// Provider failed, timed out, or an internal fault occurred.
    UpstreamError,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::UnsupportedTransformation => "UNSUPPORTED_TRANSFORMATION",
            Self::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            Self::ChainStepFailed => "CHAIN_STEP_FAILED",
            Self::UpstreamError => "UPSTREAM_ERROR",
        }
    }

    /// Returns `true` for errors the caller can fix by changing the request.
    #[must_use]
    pub const fn is_caller_fixable(self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::SchemaValidationFailed
                | Self::AlreadyExists
                | Self::NotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure carried through every host component.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct HostError {
    code: ErrorCode,
    message: String,
}

impl HostError {
    /// Creates an error with the supplied code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`ErrorCode::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::PermissionDenied`].
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Convenience constructor for [`ErrorCode::AlreadyExists`].
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    /// Convenience constructor for [`ErrorCode::PayloadTooLarge`].
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PayloadTooLarge, message)
    }

    /// Convenience constructor for [`ErrorCode::UnsupportedFormat`].
    #[must_use]
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedFormat, message)
    }

    /// Convenience constructor for [`ErrorCode::UnsupportedTransformation`].
    #[must_use]
    pub fn unsupported_transformation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedTransformation, message)
    }

    /// Convenience constructor for [`ErrorCode::SchemaValidationFailed`].
    #[must_use]
    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaValidationFailed, message)
    }

    /// Convenience constructor for [`ErrorCode::ChainStepFailed`].
    #[must_use]
    pub fn chain_step_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ChainStepFailed, message)
    }

    /// Convenience constructor for [`ErrorCode::UpstreamError`].
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, message)
    }

    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::not_found(err.to_string()),
            ErrorKind::PermissionDenied => Self::permission_denied(err.to_string()),
            ErrorKind::AlreadyExists => Self::already_exists(err.to_string()),
            _ => Self::upstream(format!("i/o error: {err}")),
        }
    }
}
