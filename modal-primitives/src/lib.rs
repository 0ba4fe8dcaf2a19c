//! Core shared types for the multimodal tool host.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod format;
mod ids;
mod model;

/// Closed error taxonomy and result alias shared across the host.
pub use error::{ErrorCode, HostError, Result};
/// Media formats accepted and produced by tools.
pub use format::{MediaFormat, MediaKind};
/// Unique identifier attached to every invocation.
pub use ids::InvocationId;
/// Model categories used for model-name resolution.
pub use model::ModelCategory;
