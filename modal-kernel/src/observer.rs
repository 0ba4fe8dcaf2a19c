//! Envelope observers.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::envelope::Envelope;

/// Observer trait used to capture envelopes (for logging, metrics, etc.).
pub trait EnvelopeSink: Send + Sync {
    /// Records an envelope produced for `tool`.
    fn record(&self, tool: &str, envelope: &Envelope);
}

/// Sink implementation that logs to tracing.
#[derive(Debug, Default)]
pub struct TracingEnvelopeSink;

impl EnvelopeSink for TracingEnvelopeSink {
    fn record(&self, tool: &str, envelope: &Envelope) {
        let metadata = envelope.metadata();
        let field = |name: &str| {
            metadata
                .and_then(|map| map.get(name))
                .map(ToString::to_string)
                .unwrap_or_default()
        };
        match envelope.error() {
            None => info!(
                tool,
                invocation_id = %field("invocation_id"),
                model = %field("model"),
                duration_ms = %field("duration_ms"),
                outputs = envelope.outputs().len(),
                warnings = envelope.warnings().len(),
                "invocation completed"
            ),
            Some(error) => warn!(
                tool,
                invocation_id = %field("invocation_id"),
                code = %error.code,
                message = %error.message,
                outputs = envelope.outputs().len(),
                "invocation failed"
            ),
        }
    }
}

/// Sink used during testing to capture envelopes.
#[derive(Debug, Default)]
pub struct CollectingSink {
    envelopes: Mutex<Vec<Envelope>>,
}

impl CollectingSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns and clears the collected envelopes.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain(&self) -> Vec<Envelope> {
        let mut lock = self.envelopes.lock().expect("collecting sink poisoned");
        lock.drain(..).collect()
    }
}

impl EnvelopeSink for CollectingSink {
    fn record(&self, _tool: &str, envelope: &Envelope) {
        self.envelopes
            .lock()
            .expect("collecting sink poisoned")
            .push(envelope.clone());
    }
}

/// Fans envelopes out to several sinks.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn EnvelopeSink>>,
}

impl CompositeSink {
    /// Creates a composite over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EnvelopeSink>>) -> Self {
        Self { sinks }
    }
}

impl EnvelopeSink for CompositeSink {
    fn record(&self, tool: &str, envelope: &Envelope) {
        for sink in &self.sinks {
            sink.record(tool, envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modal_primitives::HostError;
    use serde_json::Map;

    #[test]
    fn composite_forwards_to_every_sink() {
        let first = CollectingSink::new();
        let second = CollectingSink::new();
        let sinks: Vec<Arc<dyn EnvelopeSink>> = vec![first.clone(), second.clone()];
        let composite = CompositeSink::new(sinks);

        let envelope = Envelope::failure(&HostError::not_found("missing"), Map::new(), Vec::new());
        composite.record("image_analyze", &envelope);
        TracingEnvelopeSink.record("image_analyze", &envelope);

        assert_eq!(first.drain(), vec![envelope.clone()]);
        assert_eq!(second.drain(), vec![envelope]);
        assert!(first.drain().is_empty());
    }
}
