//! Deterministic multimodal tool host facade.
//!
//! Bundles the host crates behind feature flags so embedders can pull in
//! only the schema and catalog layers, or the whole execution stack.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use modal_host::config::HostConfig;
//! use modal_host::kernel::ToolHost;
//! use serde_json::json;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Arc::new(HostConfig::from_env()?);
//! let host = ToolHost::openai(config)?;
//! let envelope = host
//!     .call("image_analyze", json!({"image_ref": "cat.png", "instruction": "describe"}))
//!     .await;
//! println!("{}", envelope.to_json());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use modal_primitives as primitives;

/// Host configuration.
pub use modal_config as config;

/// Schema descriptors and validation.
pub use modal_schema as schema;

/// Tool catalog and registry.
pub use modal_tools as tools;

/// Invocation pipeline, chains and envelopes (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use modal_kernel as kernel;

/// Provider adapters and remote transfers (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use modal_adapters as adapters;

/// Path and size gatekeeping (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use modal_policy as policy;

/// Tracing installation (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use modal_telemetry as telemetry;

#[cfg(feature = "kernel")]
pub use modal_kernel::{ChainRequest, ChainStep, Envelope, Invocation, ToolHost};
