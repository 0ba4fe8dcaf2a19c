//! Authorized resource handles.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Direction of access requested for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Bytes flow from the resource into the host.
    Read,
    /// Bytes flow from the host into the resource.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Where an authorized resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    /// Absolute, normalized local path.
    Local(PathBuf),
    /// Remote URL (download source or presigned upload target).
    Remote(String),
}

/// Handle produced by the [`Gatekeeper`](crate::Gatekeeper) once a reference
/// passed policy. It cannot be constructed outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    reference: String,
    location: ResourceLocation,
    mode: AccessMode,
    byte_limit: u64,
    size: Option<u64>,
    exists: bool,
}

impl ResourceRef {
    pub(crate) fn local(
        reference: &str,
        path: PathBuf,
        mode: AccessMode,
        byte_limit: u64,
        size: Option<u64>,
        exists: bool,
    ) -> Self {
        Self {
            reference: reference.to_owned(),
            location: ResourceLocation::Local(path),
            mode,
            byte_limit,
            size,
            exists,
        }
    }

    pub(crate) fn remote(reference: &str, mode: AccessMode, byte_limit: u64) -> Self {
        Self {
            reference: reference.to_owned(),
            location: ResourceLocation::Remote(reference.to_owned()),
            mode,
            byte_limit,
            size: None,
            exists: false,
        }
    }

    /// Returns the reference exactly as the caller supplied it.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns the resolved location.
    #[must_use]
    pub fn location(&self) -> &ResourceLocation {
        &self.location
    }

    /// Returns the local path when the resource is on disk.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            ResourceLocation::Local(path) => Some(path),
            ResourceLocation::Remote(_) => None,
        }
    }

    /// Returns `true` for remote resources.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self.location, ResourceLocation::Remote(_))
    }

    /// Returns the authorized access mode.
    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns the byte ceiling transfers through this handle must respect.
    #[must_use]
    pub const fn byte_limit(&self) -> u64 {
        self.byte_limit
    }

    /// Returns the probed size: the file size for reads, the size of the
    /// existing target for writes. `None` when unknown (remote) or absent.
    #[must_use]
    pub const fn size(&self) -> Option<u64> {
        self.size
    }

    /// Returns `true` when a write target already exists.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// Returns the canonical string form used in envelopes.
    #[must_use]
    pub fn display_ref(&self) -> String {
        match &self.location {
            ResourceLocation::Local(path) => path.display().to_string(),
            ResourceLocation::Remote(url) => url.clone(),
        }
    }
}
