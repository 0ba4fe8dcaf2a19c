//! Execution core of the multimodal tool host.
//!
//! [`ToolHost`] is the entry point: it resolves a tool, runs the
//! single-tool [`Pipeline`] or the [`ChainExecutor`], and always answers
//! with an [`Envelope`]. Panics inside the pipeline are caught and reported
//! as `UPSTREAM_ERROR`, so callers never observe a torn invocation.

#![warn(missing_docs, clippy::pedantic)]

mod chain;
mod envelope;
mod invoker;
mod media;
mod observer;
mod pipeline;
mod storage;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use modal_adapters::openai::{OpenAiAdapter, OpenAiConfig};
use modal_adapters::remote::{HttpRemoteStore, RemoteStore};
use modal_adapters::traits::{ProviderAdapter, ProviderResult};
use modal_config::HostConfig;
use modal_primitives::{HostError, InvocationId, Result};
use modal_tools::{ToolDescriptor, ToolKind, ToolRegistry};
use serde_json::{Map, Value};
use tracing::debug;

pub use chain::{
    ChainEvent, ChainExecutor, ChainPhase, ChainPhaseError, ChainReport, ChainRequest, ChainStep,
    FailedStep, is_symbol_name,
};
pub use envelope::{Envelope, EnvelopeError, OutputDescriptor};
pub use invoker::{
    Invoker, ModelSource, OperationInputs, OperationPayload, OperationResult, map_provider_error,
    resolve_model, sha256_hex,
};
pub use media::{check_mask, detect_input, dimensions, require_wav_or_mp3, sniff};
pub use observer::{CollectingSink, CompositeSink, EnvelopeSink, TracingEnvelopeSink};
pub use pipeline::{Pipeline, StepOutcome};
pub use storage::ResourceIo;

/// One request to execute a single named tool.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    tool: String,
    arguments: Value,
    model: Option<String>,
    format: Option<String>,
}

impl Invocation {
    /// Creates an invocation of `tool` with JSON-object `arguments`.
    #[must_use]
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            model: None,
            format: None,
        }
    }

    /// Overrides the model for this call.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides the output format for this call.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Merges caller overrides into the argument object.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_ARGUMENT` when the arguments are not a JSON object.
    pub fn arguments(&self) -> Result<Value> {
        let Value::Object(map) = &self.arguments else {
            return Err(HostError::invalid_argument(format!(
                "{} arguments must be a JSON object",
                self.tool
            )));
        };
        let mut map = map.clone();
        if let Some(model) = &self.model {
            map.insert("model".to_owned(), Value::from(model.clone()));
        }
        if let Some(format) = &self.format {
            map.insert("format".to_owned(), Value::from(format.clone()));
        }
        Ok(Value::Object(map))
    }
}

/// Tool host: the single entry point for invocations and chains.
///
/// Cheap to share: configuration, registry and pipeline sit behind `Arc`
/// and are never mutated after construction, so one host serves any number
/// of concurrent callers.
#[derive(Clone)]
pub struct ToolHost {
    config: Arc<HostConfig>,
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn EnvelopeSink>,
}

impl fmt::Debug for ToolHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHost")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl ToolHost {
    /// Creates a host backed by `adapter`, the built-in catalog and HTTP
    /// remote transfers.
    #[must_use]
    pub fn new(config: Arc<HostConfig>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let remote: Arc<dyn RemoteStore> =
            Arc::new(HttpRemoteStore::new(config.provider().timeout));
        let pipeline = Pipeline::new(
            &config,
            Arc::new(ToolRegistry::builtin()),
            Invoker::new(adapter, Arc::clone(&config)),
            ResourceIo::new(remote),
        );
        Self {
            config,
            pipeline: Arc::new(pipeline),
            sink: Arc::new(TracingEnvelopeSink),
        }
    }

    /// Creates a host talking to the OpenAI-compatible provider described
    /// by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`](modal_adapters::traits::ProviderError)
    /// when the API key is missing or the base URL is invalid.
    pub fn openai(config: Arc<HostConfig>) -> ProviderResult<Self> {
        let adapter = OpenAiAdapter::new(
            OpenAiConfig::from_settings(config.provider())?
                .with_download_limit(config.limits().max_output_bytes),
        )?;
        Ok(Self::new(config, Arc::new(adapter)))
    }

    /// Replaces the tool registry, e.g. with a subset of the catalog.
    #[must_use]
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        Arc::make_mut(&mut self.pipeline).set_registry(Arc::new(registry));
        self
    }

    /// Replaces the store used for remote inputs and presigned uploads.
    #[must_use]
    pub fn with_remote_store(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        Arc::make_mut(&mut self.pipeline).set_io(ResourceIo::new(remote));
        self
    }

    /// Replaces the envelope sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EnvelopeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the shared configuration.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        self.pipeline.registry()
    }

    /// Lists the registered tools in catalog order.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.registry().list()
    }

    /// Executes `name` with wire `arguments`, dispatching
    /// `multimodal_chain` to the chain executor.
    pub async fn call(&self, name: &str, arguments: Value) -> Envelope {
        if name == ToolKind::MultimodalChain.name() {
            let request = self
                .registry()
                .resolve(name)
                .and_then(|spec| spec.validate_arguments(&arguments))
                .and_then(|()| ChainRequest::from_arguments(&arguments));
            return match request {
                Ok(request) => self.run_chain(request).await,
                Err(err) => self.reject(name, &err),
            };
        }
        self.invoke(Invocation::new(name, arguments)).await
    }

    /// Executes a single tool.
    pub async fn invoke(&self, invocation: Invocation) -> Envelope {
        let id = InvocationId::random();
        let started_at = Utc::now();
        let clock = Instant::now();
        let tool = invocation.tool().to_owned();
        debug!(tool = %tool, invocation_id = %id, "invocation started");

        let outcome = AssertUnwindSafe(self.execute(&invocation))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(HostError::upstream("internal fault")));

        let mut metadata = base_metadata(&tool, id, started_at);
        if let Ok(step) = &outcome {
            metadata.extend(step.metadata());
        }
        metadata.insert(
            "duration_ms".to_owned(),
            Value::from(pipeline::millis(clock.elapsed())),
        );
        let envelope = match outcome {
            Ok(step) => Envelope::success(
                step.output().cloned().into_iter().collect(),
                step.data().cloned(),
                metadata,
                step.warnings().to_vec(),
            ),
            Err(err) => Envelope::failure(&err, metadata, Vec::new()),
        };
        self.sink.record(&tool, &envelope);
        envelope
    }

    /// Executes a chain of tools.
    pub async fn run_chain(&self, request: ChainRequest) -> Envelope {
        let tool = ToolKind::MultimodalChain.name();
        let id = InvocationId::random();
        let started_at = Utc::now();
        let clock = Instant::now();
        debug!(tool, invocation_id = %id, steps = request.steps.len(), "chain started");

        let chain_spec = match self.registry().resolve(tool) {
            Ok(spec) => spec,
            Err(err) => return self.reject(tool, &err),
        };
        let executor =
            ChainExecutor::new(&self.pipeline, chain_spec, self.config.max_chain_steps());
        let report = AssertUnwindSafe(executor.run(&request))
            .catch_unwind()
            .await;

        let mut metadata = base_metadata(tool, id, started_at);
        metadata.insert(
            "duration_ms".to_owned(),
            Value::from(pipeline::millis(clock.elapsed())),
        );
        let envelope = match report {
            Ok(report) => report.into_envelope(metadata),
            Err(_) => Envelope::failure(
                &HostError::upstream("internal fault"),
                metadata,
                Vec::new(),
            ),
        };
        self.sink.record(tool, &envelope);
        envelope
    }

    async fn execute(&self, invocation: &Invocation) -> Result<StepOutcome> {
        let spec = self.registry().resolve(invocation.tool())?;
        if spec.kind() == ToolKind::MultimodalChain {
            return Err(HostError::invalid_argument(
                "multimodal_chain must be run through run_chain or call",
            ));
        }
        let arguments = invocation.arguments()?;
        self.pipeline.run(spec, &arguments).await
    }

    fn reject(&self, tool: &str, err: &HostError) -> Envelope {
        let metadata = base_metadata(tool, InvocationId::random(), Utc::now());
        let envelope = Envelope::failure(err, metadata, Vec::new());
        self.sink.record(tool, &envelope);
        envelope
    }
}

fn base_metadata(tool: &str, id: InvocationId, started_at: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("tool".to_owned(), Value::from(tool));
    map.insert("invocation_id".to_owned(), Value::from(id.to_string()));
    map.insert("started_at".to_owned(), Value::from(started_at.to_rfc3339()));
    map
}
