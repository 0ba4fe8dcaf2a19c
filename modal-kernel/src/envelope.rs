//! Uniform success/failure envelopes returned to callers.

use modal_primitives::{ErrorCode, HostError, MediaFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptor of one artifact written by a tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Resolved reference of the written artifact.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Encoding of the artifact.
    pub format: MediaFormat,
    /// Size in bytes.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

impl OutputDescriptor {
    /// Returns the descriptor as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("ref".to_owned(), Value::from(self.reference.clone()));
        map.insert("format".to_owned(), Value::from(self.format.as_str()));
        map.insert("bytes".to_owned(), Value::from(self.bytes));
        map.insert("sha256".to_owned(), Value::from(self.sha256.clone()));
        Value::Object(map)
    }
}

/// Error half of an envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    /// Closed error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl From<&HostError> for EnvelopeError {
    fn from(err: &HostError) -> Self {
        Self {
            code: err.code(),
            message: err.message().to_owned(),
        }
    }
}

/// Response returned for every invocation.
///
/// Absent fields are omitted when serialized. A single-tool envelope carries
/// either the success fields or `error`, never both; a failed chain is the
/// one case where `outputs` accompanies `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outputs: Option<Vec<OutputDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<EnvelopeError>,
}

impl Envelope {
    /// Builds a success envelope.
    #[must_use]
    pub fn success(
        outputs: Vec<OutputDescriptor>,
        data: Option<Value>,
        metadata: Map<String, Value>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            ok: true,
            outputs: non_empty(outputs),
            data,
            metadata: Some(metadata),
            warnings: non_empty(warnings),
            error: None,
        }
    }

    /// Builds a failure envelope for a single tool.
    #[must_use]
    pub fn failure(err: &HostError, metadata: Map<String, Value>, warnings: Vec<String>) -> Self {
        Self {
            ok: false,
            outputs: None,
            data: None,
            metadata: Some(metadata),
            warnings: non_empty(warnings),
            error: Some(err.into()),
        }
    }

    /// Builds the failure envelope of a chain that stopped after committing
    /// `outputs`.
    #[must_use]
    pub fn chain_failure(
        outputs: Vec<OutputDescriptor>,
        err: &HostError,
        metadata: Map<String, Value>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            ok: false,
            outputs: Some(outputs),
            data: None,
            metadata: Some(metadata),
            warnings: non_empty(warnings),
            error: Some(err.into()),
        }
    }

    /// Returns `true` for success envelopes.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.ok
    }

    /// Returns the written artifacts.
    #[must_use]
    pub fn outputs(&self) -> &[OutputDescriptor] {
        self.outputs.as_deref().unwrap_or_default()
    }

    /// Returns the inline result, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns the metadata object, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    /// Returns the accumulated warnings.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        self.warnings.as_deref().unwrap_or_default()
    }

    /// Returns the error, if the envelope reports a failure.
    #[must_use]
    pub fn error(&self) -> Option<&EnvelopeError> {
        self.error.as_ref()
    }

    /// Renders the envelope as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Null)
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}
