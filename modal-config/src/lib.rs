//! Configuration management for the tool host.
//!
//! The host consumes a single immutable [`HostConfig`] built once at startup,
//! either programmatically or from environment-style key/value pairs. Absent
//! keys always fall back to built-in defaults.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigResult};
pub use schema::{AccessFlags, ByteLimits, HostConfig, ModelSettings, ProviderSettings};
