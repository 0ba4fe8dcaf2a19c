//! Inference provider adapters used by the tool host.
//!
//! [`traits`] defines the provider-neutral request/response vocabulary and
//! the [`ProviderAdapter`](traits::ProviderAdapter) seam. [`openai`] is the
//! production implementation; [`remote`] moves bytes to and from remote
//! URLs for remote inputs and presigned upload targets.

#![warn(missing_docs, clippy::pedantic)]

pub mod multipart;
pub mod openai;
pub mod remote;
pub mod traits;

mod http_client;
