//! Correlation ids for invocations.
//!
//! Every envelope carries the id of the call that produced it in
//! `metadata.invocation_id`; chain steps share the id of their chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::HostError;

/// Random v4 id minted when a tool call or chain run starts.
///
/// Serializes as the bare hyphenated UUID, the same text that appears in
/// envelope metadata and log fields.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Mints a fresh id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl From<Uuid> for InvocationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for InvocationId {
    type Err = HostError;

    /// Parses the id echoed back by a caller, e.g. when correlating logs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|err| HostError::invalid_argument(format!("`{s}` is not an invocation id: {err}")))
    }
}
