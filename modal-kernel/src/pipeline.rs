//! Single-tool execution pipeline.
//!
//! Validates arguments, runs the pre-dispatch checks, authorizes every
//! reference through the gatekeeper, loads inputs, performs the one
//! provider call and commits the artifact of file-writing tools.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use modal_adapters::traits::MediaPayload;
use modal_config::HostConfig;
use modal_policy::{Gatekeeper, ResourceRef};
use modal_primitives::{HostError, MediaFormat, MediaKind, Result};
use modal_schema::SchemaNode;
use modal_tools::{ToolKind, ToolRegistry, ToolSpec};
use serde_json::{Map, Value};
use tracing::debug;

use crate::envelope::OutputDescriptor;
use crate::invoker::{Invoker, ModelSource, OperationInputs, OperationPayload};
use crate::media;
use crate::storage::ResourceIo;

/// Result of one successfully executed tool.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    tool: &'static str,
    output: Option<OutputDescriptor>,
    payload: OperationPayload,
    model: String,
    model_source: ModelSource,
    duration: Duration,
    warnings: Vec<String>,
}

impl StepOutcome {
    /// Returns the tool that ran.
    #[must_use]
    pub const fn tool(&self) -> &'static str {
        self.tool
    }

    /// Returns the written artifact, for file-writing tools.
    #[must_use]
    pub fn output(&self) -> Option<&OutputDescriptor> {
        self.output.as_ref()
    }

    /// Returns the raw payload produced by the provider call.
    #[must_use]
    pub fn payload(&self) -> &OperationPayload {
        &self.payload
    }

    /// Returns the inline result, for analytical tools.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match &self.payload {
            OperationPayload::Data(value) => Some(value),
            OperationPayload::Bytes { .. } => None,
        }
    }

    /// Returns the model that served the call.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns validation warnings.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Provenance fields reported in envelope metadata.
    #[must_use]
    pub fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("model".to_owned(), Value::from(self.model.clone()));
        map.insert(
            "model_source".to_owned(),
            Value::from(self.model_source.as_str()),
        );
        map.insert("provider_ms".to_owned(), Value::from(millis(self.duration)));
        map
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Executes single tools end to end.
#[derive(Clone, Debug)]
pub struct Pipeline {
    registry: Arc<ToolRegistry>,
    gatekeeper: Gatekeeper,
    invoker: Invoker,
    io: ResourceIo,
}

impl Pipeline {
    /// Wires the pipeline components together.
    #[must_use]
    pub fn new(
        config: &HostConfig,
        registry: Arc<ToolRegistry>,
        invoker: Invoker,
        io: ResourceIo,
    ) -> Self {
        Self {
            registry,
            gatekeeper: Gatekeeper::new(config),
            invoker,
            io,
        }
    }

    /// Returns the registry tools are resolved from.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub(crate) fn set_registry(&mut self, registry: Arc<ToolRegistry>) {
        self.registry = registry;
    }

    pub(crate) fn set_io(&mut self, io: ResourceIo) {
        self.io = io;
    }

    /// Runs one non-composite tool.
    ///
    /// # Errors
    ///
    /// Returns the first failure among argument validation, pre-dispatch
    /// checks, authorization, input loading, the provider call, output
    /// validation and the artifact write. Nothing reaches the provider
    /// unless every earlier stage passed.
    pub async fn run(&self, spec: &ToolSpec, arguments: &Value) -> Result<StepOutcome> {
        spec.validate_arguments(arguments)?;
        let Value::Object(args) = arguments else {
            return Err(HostError::invalid_argument(format!(
                "{} arguments must be an object",
                spec.name()
            )));
        };
        let mut inputs = prepare(spec, args)?;

        let image = self.authorize_input(args, "image_ref").await?;
        let mask = self.authorize_input(args, "mask_ref").await?;
        let audio = self.authorize_input(args, "audio_ref").await?;

        let overwrite = overwrite(args);
        let target = if spec.writes_file() {
            let reference = str_arg(args, "output_ref")?;
            let target = self.gatekeeper.authorize_write(reference).await?;
            self.registry.check_output_target(spec, &target, overwrite)?;
            Some(target)
        } else {
            None
        };

        inputs.image = self.load(image.as_ref(), MediaKind::Image).await?;
        inputs.mask = self.load(mask.as_ref(), MediaKind::Image).await?;
        inputs.audio = self.load(audio.as_ref(), MediaKind::Audio).await?;
        check_media(spec, &inputs, mask.as_ref(), audio.as_ref())?;

        let result = self.invoker.invoke(spec, args, inputs).await?;

        let output = match (&target, &result.payload) {
            (Some(target), OperationPayload::Bytes { bytes, format, sha256 }) => Some(
                self.commit(target, overwrite, bytes.clone(), *format, sha256.clone())
                    .await?,
            ),
            (Some(_), OperationPayload::Data(_)) => {
                return Err(HostError::upstream(format!(
                    "{} produced no artifact to write",
                    spec.name()
                )));
            }
            (None, _) => None,
        };

        debug!(
            tool = spec.name(),
            model = %result.model,
            written = output.is_some(),
            "tool completed"
        );
        Ok(StepOutcome {
            tool: spec.name(),
            output,
            payload: result.payload,
            model: result.model,
            model_source: result.model_source,
            duration: result.duration,
            warnings: result.warnings,
        })
    }

    /// Authorizes `reference` for writing on behalf of `spec` and commits
    /// `bytes` there.
    ///
    /// # Errors
    ///
    /// Returns the gatekeeper failure, `ALREADY_EXISTS` when the target
    /// exists and `overwrite` is false, or the write failure.
    pub async fn write_artifact(
        &self,
        spec: &ToolSpec,
        reference: &str,
        overwrite: bool,
        bytes: Bytes,
        format: MediaFormat,
        sha256: String,
    ) -> Result<OutputDescriptor> {
        let target = self.gatekeeper.authorize_write(reference).await?;
        self.registry.check_output_target(spec, &target, overwrite)?;
        self.commit(&target, overwrite, bytes, format, sha256).await
    }

    async fn commit(
        &self,
        target: &ResourceRef,
        overwrite: bool,
        bytes: Bytes,
        format: MediaFormat,
        sha256: String,
    ) -> Result<OutputDescriptor> {
        let size = bytes.len() as u64;
        self.io.write(target, bytes, format, overwrite).await?;
        Ok(OutputDescriptor {
            reference: target.display_ref(),
            format,
            bytes: size,
            sha256,
        })
    }

    async fn authorize_input(
        &self,
        args: &Map<String, Value>,
        key: &str,
    ) -> Result<Option<ResourceRef>> {
        match args.get(key).and_then(Value::as_str) {
            Some(reference) => Ok(Some(self.gatekeeper.authorize_read(reference).await?)),
            None => Ok(None),
        }
    }

    async fn load(
        &self,
        resource: Option<&ResourceRef>,
        kind: MediaKind,
    ) -> Result<Option<MediaPayload>> {
        let Some(resource) = resource else {
            return Ok(None);
        };
        let bytes = self.io.read(resource).await?;
        let format = media::detect_input(resource.reference(), &bytes, kind)?;
        Ok(Some(MediaPayload::new(bytes, format)))
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::invalid_argument(format!("missing argument `{key}`")))
}

fn overwrite(args: &Map<String, Value>) -> bool {
    args.get("overwrite")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Checks that depend on several arguments at once, before any I/O.
fn prepare(spec: &ToolSpec, args: &Map<String, Value>) -> Result<OperationInputs> {
    let mut inputs = OperationInputs::default();

    if spec.writes_file() {
        let output_ref = str_arg(args, "output_ref")?;
        let requested = args.get("format").and_then(Value::as_str);
        inputs.output_format = Some(spec.resolve_output_format(requested, output_ref)?);
    }

    let structured = match spec.kind() {
        ToolKind::ImageAnalyze | ToolKind::AudioAnalyze => {
            args.get("response_format").and_then(Value::as_str) == Some("json")
        }
        ToolKind::ImageExtract => true,
        ToolKind::ImageToSpec => inputs.output_format == Some(MediaFormat::Json),
        _ => false,
    };

    let schema = args
        .get("json_schema")
        .map(|raw| {
            SchemaNode::from_json(raw).map_err(|err| {
                HostError::invalid_argument(format!("{}: invalid json_schema: {err}", spec.name()))
            })
        })
        .transpose()?;

    if structured {
        let schema = schema.ok_or_else(|| {
            HostError::invalid_argument(format!(
                "{}: structured output requires `json_schema`",
                spec.name()
            ))
        })?;
        inputs.output_schema = Some(schema);
    }
    Ok(inputs)
}

fn check_media(
    spec: &ToolSpec,
    inputs: &OperationInputs,
    mask: Option<&ResourceRef>,
    audio: Option<&ResourceRef>,
) -> Result<()> {
    if let (Some(image), Some(mask_payload)) = (&inputs.image, &inputs.mask) {
        media::check_mask(
            &image.bytes,
            image.format,
            &mask_payload.bytes,
            mask_payload.format,
        )
        .map_err(|err| match mask {
            Some(mask) => HostError::new(
                err.code(),
                format!("`{}`: {}", mask.reference(), err.message()),
            ),
            None => err,
        })?;
    }
    if matches!(spec.kind(), ToolKind::AudioAnalyze | ToolKind::AudioTransform) {
        if let (Some(payload), Some(resource)) = (&inputs.audio, audio) {
            media::require_wav_or_mp3(resource.reference(), payload.format)?;
        }
    }
    Ok(())
}
