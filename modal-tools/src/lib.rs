//! Tool registry and static catalog for the multimodal host.
//!
//! Every tool the host exposes is a [`ToolKind`] variant described by an
//! immutable [`ToolSpec`]. The [`ToolRegistry`] resolves names to specs and
//! enforces the write-target collision rule before anything is dispatched.

#![warn(missing_docs, clippy::pedantic)]

mod catalog;
mod kind;
mod registry;
mod spec;

pub use catalog::builtin_specs;
pub use kind::ToolKind;
pub use registry::{ToolRegistry, ToolSpecError};
pub use spec::{OutputMode, ToolDescriptor, ToolSpec};
