//! Errors raised while interpreting schema documents.

use thiserror::Error;

/// Errors produced when a JSON Schema document cannot be turned into a
/// [`SchemaNode`](crate::SchemaNode).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The document (or a nested part of it) is not a schema object.
    #[error("malformed schema at {path}: {reason}")]
    Malformed {
        /// Location inside the schema document.
        path: String,
        /// Why the fragment was rejected.
        reason: String,
    },

    /// The document names a type this validator does not understand.
    #[error("unsupported schema type `{name}` at {path}")]
    UnsupportedType {
        /// Location inside the schema document.
        path: String,
        /// Offending type name.
        name: String,
    },
}

impl SchemaError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result alias for schema parsing.
pub type SchemaResult<T> = Result<T, SchemaError>;
