//! Chain executor: bounded, sequential, first-failure composition.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use modal_primitives::{ErrorCode, HostError, MediaFormat, Result};
use modal_tools::{OutputMode, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::envelope::{Envelope, OutputDescriptor};
use crate::invoker::{OperationPayload, sha256_hex};
use crate::pipeline::{Pipeline, StepOutcome};

/// Phase of a chain run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainPhase {
    /// Pre-flight has not finished.
    #[default]
    Pending,
    /// Executing the step at this index; `steps.len()` is the final write.
    Running(usize),
    /// Every step and the final write succeeded.
    Succeeded,
    /// The chain stopped on its first failure.
    Failed,
}

impl ChainPhase {
    /// Returns `true` once the chain can no longer make progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Applies `event`, returning the resulting phase.
    ///
    /// # Errors
    ///
    /// Returns [`ChainPhaseError::InvalidTransition`] for events the
    /// current phase does not accept.
    pub fn transition(&mut self, event: ChainEvent) -> std::result::Result<Self, ChainPhaseError> {
        let next = match (*self, event) {
            (Self::Pending, ChainEvent::Start) => Some(Self::Running(0)),
            (Self::Running(index), ChainEvent::Advance) => Some(Self::Running(index + 1)),
            (Self::Running(_), ChainEvent::Complete) => Some(Self::Succeeded),
            (Self::Pending | Self::Running(_), ChainEvent::Fail) => Some(Self::Failed),
            _ => None,
        };

        let Some(next) = next else {
            return Err(ChainPhaseError::InvalidTransition { from: *self, event });
        };
        debug!(from = ?*self, to = ?next, ?event, "chain phase transition");
        *self = next;
        Ok(next)
    }
}

/// Events driving [`ChainPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEvent {
    /// Pre-flight passed; run step 0.
    Start,
    /// The current step succeeded.
    Advance,
    /// All work finished.
    Complete,
    /// Pre-flight or a step failed.
    Fail,
}

/// Errors emitted by the chain phase machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainPhaseError {
    /// Transition was not permitted from the current phase.
    #[error("invalid chain transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// Phase prior to the attempted transition.
        from: ChainPhase,
        /// Event that triggered the failure.
        event: ChainEvent,
    },
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// One step of a chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainStep {
    /// Tool to run.
    pub tool: String,
    /// Arguments, possibly containing `${symbol}` placeholders.
    #[serde(default = "empty_object")]
    pub arguments: Value,
    /// Name under which the step result is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_symbol: Option<String>,
}

impl ChainStep {
    /// Creates a step without an output symbol.
    #[must_use]
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            output_symbol: None,
        }
    }

    /// Stores the step result under `symbol`.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.output_symbol = Some(symbol.into());
        self
    }
}

/// Typed `multimodal_chain` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainRequest {
    /// Steps in execution order.
    pub steps: Vec<ChainStep>,
    /// Where to write the designated artifact once every step succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output_ref: Option<String>,
    /// Symbol designating the final artifact; defaults to the last step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_symbol: Option<String>,
    /// Replace an existing final target.
    #[serde(default)]
    pub overwrite: bool,
}

impl ChainRequest {
    /// Creates a request from its steps.
    #[must_use]
    pub fn new(steps: Vec<ChainStep>) -> Self {
        Self {
            steps,
            final_output_ref: None,
            final_symbol: None,
            overwrite: false,
        }
    }

    /// Writes the designated artifact to `reference` after the last step.
    #[must_use]
    pub fn with_final_output(mut self, reference: impl Into<String>) -> Self {
        self.final_output_ref = Some(reference.into());
        self
    }

    /// Designates the final artifact by symbol.
    #[must_use]
    pub fn with_final_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.final_symbol = Some(symbol.into());
        self
    }

    /// Sets whether the final target may be replaced.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Decodes the wire arguments of `multimodal_chain`.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_ARGUMENT` when the arguments do not describe a chain.
    pub fn from_arguments(arguments: &Value) -> Result<Self> {
        Self::deserialize(arguments)
            .map_err(|err| HostError::invalid_argument(format!("invalid chain request: {err}")))
    }
}

/// Details of the step that stopped a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    /// Zero-based index; equals the step count for the final write.
    pub index: usize,
    /// Tool of the failing step.
    pub tool: String,
    /// Underlying error code.
    pub code: ErrorCode,
    /// Underlying error message.
    pub message: String,
}

#[derive(Debug)]
struct ChainFailure {
    error: HostError,
    failed_step: Option<FailedStep>,
}

impl ChainFailure {
    fn whole_chain(error: HostError) -> Self {
        Self {
            error,
            failed_step: None,
        }
    }

    fn step(index: usize, tool: &str, err: &HostError) -> Self {
        warn!(step = index, tool, code = %err.code(), "chain step failed");
        Self {
            error: HostError::chain_step_failed(format!(
                "step {index} ({tool}) failed: {}: {}",
                err.code(),
                err.message()
            )),
            failed_step: Some(FailedStep {
                index,
                tool: tool.to_owned(),
                code: err.code(),
                message: err.message().to_owned(),
            }),
        }
    }
}

impl From<ChainPhaseError> for ChainFailure {
    fn from(err: ChainPhaseError) -> Self {
        Self::whole_chain(HostError::upstream(format!("internal fault: {err}")))
    }
}

/// What a chain run produced, successful or not.
#[derive(Debug)]
pub struct ChainReport {
    phase: ChainPhase,
    outputs: Vec<OutputDescriptor>,
    data: Option<Value>,
    steps: Vec<Value>,
    warnings: Vec<String>,
    failure: Option<ChainFailure>,
}

impl ChainReport {
    /// Returns the terminal phase.
    #[must_use]
    pub const fn phase(&self) -> ChainPhase {
        self.phase
    }

    /// Returns every committed artifact in step order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputDescriptor] {
        &self.outputs
    }

    /// Returns the failing step, if a step stopped the chain.
    #[must_use]
    pub fn failed_step(&self) -> Option<&FailedStep> {
        self.failure.as_ref().and_then(|failure| failure.failed_step.as_ref())
    }

    /// Returns the error that stopped the chain.
    #[must_use]
    pub fn error(&self) -> Option<&HostError> {
        self.failure.as_ref().map(|failure| &failure.error)
    }

    /// Assembles the envelope, extending `metadata` with per-step details.
    #[must_use]
    pub fn into_envelope(self, mut metadata: Map<String, Value>) -> Envelope {
        metadata.insert("steps".to_owned(), Value::Array(self.steps));
        match self.failure {
            None => Envelope::success(self.outputs, self.data, metadata, self.warnings),
            Some(ChainFailure {
                error,
                failed_step: None,
            }) => Envelope::failure(&error, metadata, self.warnings),
            Some(ChainFailure {
                error,
                failed_step: Some(failed),
            }) => {
                if let Ok(value) = serde_json::to_value(&failed) {
                    metadata.insert("failed_step".to_owned(), value);
                }
                Envelope::chain_failure(self.outputs, &error, metadata, self.warnings)
            }
        }
    }
}

/// Write-once symbol table of a running chain.
#[derive(Debug, Default)]
struct ChainState {
    symbols: HashMap<String, usize>,
    outcomes: Vec<StepOutcome>,
}

impl ChainState {
    fn store(&mut self, symbol: Option<&str>, outcome: StepOutcome) -> Result<()> {
        let index = self.outcomes.len();
        if let Some(symbol) = symbol {
            if self.symbols.insert(symbol.to_owned(), index).is_some() {
                return Err(HostError::invalid_argument(format!(
                    "symbol `{symbol}` is already bound"
                )));
            }
        }
        self.outcomes.push(outcome);
        Ok(())
    }

    fn lookup(&self, symbol: &str) -> Option<&StepOutcome> {
        self.symbols
            .get(symbol)
            .and_then(|index| self.outcomes.get(*index))
    }

    fn resolve(&self, placeholder: &Placeholder) -> Result<Value> {
        let outcome = self.lookup(&placeholder.symbol).ok_or_else(|| {
            HostError::invalid_argument(format!("symbol `{}` is not bound", placeholder.symbol))
        })?;
        let resolved = match (outcome.output(), outcome.data()) {
            (Some(descriptor), _) => match placeholder.path.as_slice() {
                [] => Some(Value::from(descriptor.reference.clone())),
                [field] => descriptor.to_value().get(field.as_str()).cloned(),
                _ => None,
            },
            (None, Some(data)) => walk(data, &placeholder.path).cloned(),
            (None, None) => None,
        };
        resolved.ok_or_else(|| {
            HostError::invalid_argument(format!("cannot resolve `{}`", placeholder.render()))
        })
    }

    fn substitute(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(text) => self.substitute_str(text),
            Value::Array(items) => items
                .iter()
                .map(|item| self.substitute(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.substitute(item)?)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn substitute_str(&self, text: &str) -> Result<Value> {
        let segments = parse_template(text)?;
        if let [Segment::Ref(placeholder)] = segments.as_slice() {
            return self.resolve(placeholder);
        }
        let mut rendered = String::with_capacity(text.len());
        for segment in &segments {
            match segment {
                Segment::Literal(literal) => rendered.push_str(literal),
                Segment::Ref(placeholder) => match self.resolve(placeholder)? {
                    Value::String(value) => rendered.push_str(&value),
                    value => rendered.push_str(&value.to_string()),
                },
            }
        }
        Ok(Value::String(rendered))
    }
}

fn walk<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    symbol: String,
    path: Vec<String>,
}

impl Placeholder {
    fn render(&self) -> String {
        if self.path.is_empty() {
            format!("${{{}}}", self.symbol)
        } else {
            format!("${{{}.{}}}", self.symbol, self.path.join("."))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Ref(Placeholder),
}

/// Returns `true` for names matching `[A-Za-z_][A-Za-z0-9_-]*`.
#[must_use]
pub fn is_symbol_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_template(text: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            HostError::invalid_argument(format!("unterminated placeholder in `{text}`"))
        })?;
        let mut parts = after[..end].split('.');
        let symbol = parts.next().unwrap_or_default();
        if !is_symbol_name(symbol) {
            return Err(HostError::invalid_argument(format!(
                "placeholder `${{{}}}` does not name a symbol",
                &after[..end]
            )));
        }
        let path: Vec<String> = parts.map(str::to_owned).collect();
        if path.iter().any(String::is_empty) {
            return Err(HostError::invalid_argument(format!(
                "placeholder `${{{}}}` has an empty path segment",
                &after[..end]
            )));
        }
        segments.push(Segment::Ref(Placeholder {
            symbol: symbol.to_owned(),
            path,
        }));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

fn collect_placeholders(value: &Value, out: &mut Vec<Placeholder>) -> Result<()> {
    match value {
        Value::String(text) => {
            for segment in parse_template(text)? {
                if let Segment::Ref(placeholder) = segment {
                    out.push(placeholder);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_placeholders(item, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_placeholders(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Runs chains on top of a [`Pipeline`].
#[derive(Debug)]
pub struct ChainExecutor<'a> {
    pipeline: &'a Pipeline,
    chain_spec: &'a ToolSpec,
    max_steps: usize,
}

impl<'a> ChainExecutor<'a> {
    /// Creates an executor bounded to `max_steps` steps.
    #[must_use]
    pub const fn new(pipeline: &'a Pipeline, chain_spec: &'a ToolSpec, max_steps: usize) -> Self {
        Self {
            pipeline,
            chain_spec,
            max_steps,
        }
    }

    /// Checks the whole chain statically and resolves every step's tool.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for unknown tools and `INVALID_ARGUMENT` for an
    /// empty or over-long chain, nested chains, malformed or duplicate
    /// symbols, references to symbols not produced by an earlier step, and
    /// an undeclared `final_symbol`.
    pub fn preflight(&self, request: &ChainRequest) -> Result<Vec<&'a ToolSpec>> {
        if request.steps.is_empty() {
            return Err(HostError::invalid_argument("a chain needs at least one step"));
        }
        if request.steps.len() > self.max_steps {
            return Err(HostError::invalid_argument(format!(
                "chain has {} steps; at most {} are allowed",
                request.steps.len(),
                self.max_steps
            )));
        }

        let registry = self.pipeline.registry();
        let mut declared: HashSet<&str> = HashSet::new();
        let mut specs = Vec::with_capacity(request.steps.len());
        for (index, step) in request.steps.iter().enumerate() {
            let spec = registry
                .resolve(&step.tool)
                .map_err(|err| HostError::new(err.code(), format!("step {index}: {}", err.message())))?;
            if spec.output_mode() == OutputMode::Composite {
                return Err(HostError::invalid_argument(format!(
                    "step {index}: {} cannot be nested in a chain",
                    spec.name()
                )));
            }
            if !step.arguments.is_object() {
                return Err(HostError::invalid_argument(format!(
                    "step {index}: arguments must be an object"
                )));
            }

            let mut placeholders = Vec::new();
            collect_placeholders(&step.arguments, &mut placeholders)
                .map_err(|err| HostError::invalid_argument(format!("step {index}: {}", err.message())))?;
            if let Some(unknown) = placeholders
                .iter()
                .find(|placeholder| !declared.contains(placeholder.symbol.as_str()))
            {
                return Err(HostError::invalid_argument(format!(
                    "step {index} references `{}` before an earlier step produces it",
                    unknown.render()
                )));
            }

            if let Some(symbol) = step.output_symbol.as_deref() {
                if !is_symbol_name(symbol) {
                    return Err(HostError::invalid_argument(format!(
                        "step {index}: `{symbol}` is not a valid symbol name"
                    )));
                }
                if !declared.insert(symbol) {
                    return Err(HostError::invalid_argument(format!(
                        "step {index}: symbol `{symbol}` is declared twice"
                    )));
                }
            }
            specs.push(spec);
        }

        if let Some(symbol) = request.final_symbol.as_deref() {
            if request.final_output_ref.is_none() {
                return Err(HostError::invalid_argument(
                    "final_symbol requires final_output_ref",
                ));
            }
            if !declared.contains(symbol) {
                return Err(HostError::invalid_argument(format!(
                    "final_symbol `{symbol}` is not declared by any step"
                )));
            }
        }
        Ok(specs)
    }

    /// Runs `request` to completion or first failure.
    pub async fn run(&self, request: &ChainRequest) -> ChainReport {
        let mut phase = ChainPhase::default();
        let mut report = ChainReport {
            phase,
            outputs: Vec::new(),
            data: None,
            steps: Vec::new(),
            warnings: Vec::new(),
            failure: None,
        };

        if let Err(failure) = self.drive(request, &mut phase, &mut report).await {
            if let Err(err) = phase.transition(ChainEvent::Fail) {
                warn!(error = %err, "chain already terminal when failing");
            }
            report.failure = Some(failure);
        }
        report.phase = phase;
        report
    }

    async fn drive(
        &self,
        request: &ChainRequest,
        phase: &mut ChainPhase,
        report: &mut ChainReport,
    ) -> std::result::Result<(), ChainFailure> {
        let specs = self.preflight(request).map_err(ChainFailure::whole_chain)?;
        phase.transition(ChainEvent::Start)?;

        let mut state = ChainState::default();
        for (index, (step, spec)) in request.steps.iter().zip(specs).enumerate() {
            debug!(step = index, tool = spec.name(), "chain step started");
            let outcome = match state.substitute(&step.arguments) {
                Ok(arguments) => self.pipeline.run(spec, &arguments).await,
                Err(err) => Err(err),
            }
            .map_err(|err| ChainFailure::step(index, spec.name(), &err))?;

            report.record(index, step.output_symbol.as_deref(), &outcome);
            state
                .store(step.output_symbol.as_deref(), outcome)
                .map_err(|err| ChainFailure::step(index, spec.name(), &err))?;
            phase.transition(ChainEvent::Advance)?;
        }

        let designated = match request.final_symbol.as_deref() {
            Some(symbol) => state.lookup(symbol),
            None => state.outcomes.last(),
        };
        report.data = designated.and_then(StepOutcome::data).cloned();

        if let Some(reference) = request.final_output_ref.as_deref() {
            let index = request.steps.len();
            let descriptor = match designated {
                Some(outcome) => self.write_final(reference, request.overwrite, outcome).await,
                None => Err(HostError::invalid_argument("chain produced no artifact")),
            }
            .map_err(|err| ChainFailure::step(index, self.chain_spec.name(), &err))?;
            report.outputs.push(descriptor);
        }

        phase.transition(ChainEvent::Complete)?;
        Ok(())
    }

    async fn write_final(
        &self,
        reference: &str,
        overwrite: bool,
        outcome: &StepOutcome,
    ) -> Result<OutputDescriptor> {
        let (bytes, format, sha256) = final_artifact(outcome.payload(), reference)?;
        self.pipeline
            .write_artifact(self.chain_spec, reference, overwrite, bytes, format, sha256)
            .await
    }
}

impl ChainReport {
    fn record(&mut self, index: usize, symbol: Option<&str>, outcome: &StepOutcome) {
        let mut entry = outcome.metadata();
        entry.insert("index".to_owned(), Value::from(index));
        entry.insert("tool".to_owned(), Value::from(outcome.tool()));
        if let Some(symbol) = symbol {
            entry.insert("output_symbol".to_owned(), Value::from(symbol));
        }
        self.steps.push(Value::Object(entry));
        if let Some(output) = outcome.output() {
            self.outputs.push(output.clone());
        }
        self.warnings.extend(
            outcome
                .warnings()
                .iter()
                .map(|warning| format!("step {index}: {warning}")),
        );
    }
}

/// Renders the designated payload for the final write.
///
/// Binary artifacts are copied as-is; inline strings become text and other
/// inline values pretty-printed JSON. The extension of `reference` must
/// agree with the resulting format.
fn final_artifact(payload: &OperationPayload, reference: &str) -> Result<(Bytes, MediaFormat, String)> {
    let requested = MediaFormat::from_reference(reference);
    let (bytes, format) = match payload {
        OperationPayload::Bytes { bytes, format, .. } => (bytes.clone(), *format),
        OperationPayload::Data(Value::String(text)) => {
            let format = match requested {
                Some(MediaFormat::Markdown) => MediaFormat::Markdown,
                _ => MediaFormat::Text,
            };
            (Bytes::from(text.clone()), format)
        }
        OperationPayload::Data(value) => {
            let mut rendered = serde_json::to_vec_pretty(value).map_err(|err| {
                HostError::upstream(format!("failed to render the final artifact: {err}"))
            })?;
            rendered.push(b'\n');
            (Bytes::from(rendered), MediaFormat::Json)
        }
    };
    if let Some(requested) = requested {
        let compatible = requested == format
            || matches!(
                (requested, format),
                (MediaFormat::Text | MediaFormat::Markdown, MediaFormat::Text | MediaFormat::Markdown)
            );
        if !compatible {
            return Err(HostError::invalid_argument(format!(
                "the final artifact is {format} but `{reference}` names {requested}"
            )));
        }
    }
    let sha256 = sha256_hex(&bytes);
    Ok((bytes, format, sha256))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phase_machine_follows_the_graph() {
        let mut phase = ChainPhase::default();
        assert_eq!(phase.transition(ChainEvent::Start).unwrap(), ChainPhase::Running(0));
        assert_eq!(phase.transition(ChainEvent::Advance).unwrap(), ChainPhase::Running(1));
        assert_eq!(phase.transition(ChainEvent::Complete).unwrap(), ChainPhase::Succeeded);
        assert!(phase.is_terminal());

        let err = phase.transition(ChainEvent::Advance).unwrap_err();
        assert!(matches!(
            err,
            ChainPhaseError::InvalidTransition {
                from: ChainPhase::Succeeded,
                event: ChainEvent::Advance
            }
        ));
    }

    #[test]
    fn pending_chains_can_fail_but_not_complete() {
        let mut phase = ChainPhase::default();
        assert!(phase.transition(ChainEvent::Complete).is_err());
        assert_eq!(phase.transition(ChainEvent::Fail).unwrap(), ChainPhase::Failed);
        assert!(phase.transition(ChainEvent::Start).is_err());
    }

    #[test]
    fn symbol_names_are_identifiers() {
        assert!(is_symbol_name("spec"));
        assert!(is_symbol_name("_draft-2"));
        assert!(!is_symbol_name("2nd"));
        assert!(!is_symbol_name("a.b"));
        assert!(!is_symbol_name(""));
    }

    #[test]
    fn templates_split_literals_and_placeholders() {
        let segments = parse_template("see ${spec.ref} and ${notes}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("see "),
                Segment::Ref(Placeholder {
                    symbol: "spec".into(),
                    path: vec!["ref".into()],
                }),
                Segment::Literal(" and "),
                Segment::Ref(Placeholder {
                    symbol: "notes".into(),
                    path: Vec::new(),
                }),
            ]
        );
        assert!(parse_template("${open").is_err());
        assert!(parse_template("${a..b}").is_err());
        assert_eq!(parse_template("$5 {x}").unwrap(), vec![Segment::Literal("$5 {x}")]);
    }

    #[test]
    fn paths_walk_objects_and_arrays() {
        let data = json!({"rows": [{"name": "a"}, {"name": "b"}]});
        let path = ["rows".to_owned(), "1".to_owned(), "name".to_owned()];
        assert_eq!(walk(&data, &path), Some(&json!("b")));
        assert_eq!(walk(&data, &["missing".to_owned()]), None);
    }

    #[test]
    fn chain_requests_decode_wire_arguments() {
        let request = ChainRequest::from_arguments(&json!({
            "steps": [
                {"tool": "image_analyze", "arguments": {"image_ref": "a.png", "instruction": "x"}, "output_symbol": "desc"},
                {"tool": "audio_tts", "arguments": {"text": "${desc}", "output_ref": "out.mp3"}}
            ],
            "overwrite": true
        }))
        .unwrap();
        assert_eq!(request.steps.len(), 2);
        assert_eq!(request.steps[0].output_symbol.as_deref(), Some("desc"));
        assert!(request.overwrite);

        let err = ChainRequest::from_arguments(&json!({"steps": [], "extra": 1})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn inline_strings_become_text_artifacts() {
        let payload = OperationPayload::Data(json!("# Title"));
        let (bytes, format, _) = final_artifact(&payload, "out/summary.md").unwrap();
        assert_eq!((bytes, format), (Bytes::from("# Title"), MediaFormat::Markdown));

        let payload = OperationPayload::Data(json!({"a": 1}));
        let err = final_artifact(&payload, "out/summary.png").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
