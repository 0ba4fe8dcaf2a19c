//! Access policy enforcement for tool resources.
//!
//! Every path or URL a tool reads or writes passes through the
//! [`Gatekeeper`], which yields an opaque [`ResourceRef`] only when the
//! reference is inside an allowed root, uses a permitted scheme, and fits the
//! configured byte ceilings.

#![warn(missing_docs, clippy::pedantic)]

mod gatekeeper;
mod resource;
mod scope;

pub use gatekeeper::Gatekeeper;
pub use resource::{AccessMode, ResourceLocation, ResourceRef};
