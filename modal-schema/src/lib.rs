//! Structural schemas and deterministic validation.
//!
//! JSON shapes are described by a tagged [`SchemaNode`] tree, either built in
//! code (tool input contracts) or parsed from a caller-supplied JSON Schema
//! subset. [`validate`] walks the tree depth-first in field-declaration order
//! and reports the first violation, so repeated runs produce identical
//! reports.

#![warn(missing_docs, clippy::pedantic)]

mod descriptor;
mod error;
mod parse;
mod validator;

pub use descriptor::{ArraySchema, NumberSchema, ObjectSchema, SchemaNode, StringSchema};
pub use error::{SchemaError, SchemaResult};
pub use validator::{ValidationMode, ValidationOutcome, Violation, ViolationKind, validate};
