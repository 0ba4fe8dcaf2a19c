//! Operation invoker: one provider call per tool invocation.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use modal_adapters::traits::{
    AudioAnalysisRequest, AudioTransformRequest, Capability, ImageAnalysisRequest,
    ImageEditRequest, ImageGenerationRequest, MediaPayload, ProviderAdapter, ProviderError,
    ProviderOutput, ProviderRequest, ResponseShape, SpeechRequest, TranscriptionRequest,
};
use modal_config::{HostConfig, ModelSettings};
use modal_primitives::{HostError, MediaFormat, Result};
use modal_schema::{SchemaNode, ValidationOutcome, validate};
use modal_tools::{OutputMode, ToolKind, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const DEFAULT_VOICE: &str = "alloy";
const EXTRACT_INSTRUCTION: &str =
    "Extract the information described by the JSON schema from this image.";

/// Which configuration tier supplied the model of an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Explicit `model` argument.
    Argument,
    /// Tool-specific configuration value.
    ToolConfig,
    /// Model-category configuration value.
    CategoryConfig,
    /// Built-in default of the tool's category.
    Default,
}

impl ModelSource {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Argument => "argument",
            Self::ToolConfig => "tool_config",
            Self::CategoryConfig => "category_config",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the model for `spec`: per-call argument, then tool configuration,
/// then category configuration, then the built-in default.
///
/// Returns `None` for tools that never call a model.
#[must_use]
pub fn resolve_model(
    spec: &ToolSpec,
    arguments: &Map<String, Value>,
    models: &ModelSettings,
) -> Option<(String, ModelSource)> {
    let category = spec.category()?;
    if let Some(model) = arguments.get("model").and_then(Value::as_str) {
        return Some((model.to_owned(), ModelSource::Argument));
    }
    if let Some(model) = models.tool_model(spec.name()) {
        return Some((model.to_owned(), ModelSource::ToolConfig));
    }
    if let Some(model) = models.category_model(category) {
        return Some((model.to_owned(), ModelSource::CategoryConfig));
    }
    Some((category.default_model().to_owned(), ModelSource::Default))
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Inputs loaded and checked before dispatch.
#[derive(Clone, Debug, Default)]
pub struct OperationInputs {
    /// Source image.
    pub image: Option<MediaPayload>,
    /// Edit mask.
    pub mask: Option<MediaPayload>,
    /// Source audio.
    pub audio: Option<MediaPayload>,
    /// Resolved output encoding of a file-writing tool.
    pub output_format: Option<MediaFormat>,
    /// Parsed schema structured output must satisfy.
    pub output_schema: Option<SchemaNode>,
}

/// Result of one provider call.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationPayload {
    /// Artifact bytes for a file-writing tool.
    Bytes {
        /// Encoded content.
        bytes: Bytes,
        /// Encoding of `bytes`.
        format: MediaFormat,
        /// Lowercase hex SHA-256 of `bytes`.
        sha256: String,
    },
    /// Inline JSON result of an analytical tool.
    Data(Value),
}

/// Payload plus provenance of one invocation.
#[derive(Clone, Debug)]
pub struct OperationResult {
    /// Produced payload.
    pub payload: OperationPayload,
    /// Model that served the call.
    pub model: String,
    /// Tier the model came from.
    pub model_source: ModelSource,
    /// Wall-clock duration of the provider call.
    pub duration: Duration,
    /// Best-effort validation warnings.
    pub warnings: Vec<String>,
}

/// Dispatches validated invocations to the provider.
#[derive(Clone)]
pub struct Invoker {
    adapter: Arc<dyn ProviderAdapter>,
    config: Arc<HostConfig>,
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("provider", &self.adapter.metadata().provider())
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Creates an invoker backed by `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<dyn ProviderAdapter>, config: Arc<HostConfig>) -> Self {
        Self { adapter, config }
    }

    /// Performs exactly one provider call for `spec`.
    ///
    /// # Errors
    ///
    /// Returns the translated provider failure, `SCHEMA_VALIDATION_FAILED`
    /// when structured output breaks the declared schema, and
    /// `UPSTREAM_ERROR` when the provider returns an unusable payload.
    pub async fn invoke(
        &self,
        spec: &ToolSpec,
        arguments: &Map<String, Value>,
        inputs: OperationInputs,
    ) -> Result<OperationResult> {
        let (model, model_source) = resolve_model(spec, arguments, self.config.models())
            .ok_or_else(|| {
                HostError::invalid_argument(format!("{} does not call a model", spec.name()))
            })?;

        let output_format = inputs.output_format;
        let output_schema = inputs.output_schema.clone();
        let request = build_request(spec, &Args(arguments), model.clone(), inputs)?;
        debug!(
            tool = spec.name(),
            operation = request.operation(),
            %model,
            %model_source,
            "dispatching provider call"
        );

        let started = Instant::now();
        let output = self.adapter.execute(request).await.map_err(|err| {
            warn!(tool = spec.name(), %model, error = %err, "provider call failed");
            map_provider_error(&err)
        })?;
        let duration = started.elapsed();

        let (payload, warnings) = finish(spec, output, output_format, output_schema.as_ref())?;
        Ok(OperationResult {
            payload,
            model,
            model_source,
            duration,
            warnings,
        })
    }
}

/// Translates a provider failure into the host taxonomy.
#[must_use]
pub fn map_provider_error(err: &ProviderError) -> HostError {
    match err {
        ProviderError::Unsupported {
            capability: Capability::General,
            reason,
        } => HostError::unsupported_format(reason.clone()),
        ProviderError::Unsupported { capability, reason } => HostError::unsupported_transformation(
            format!("{capability} is not supported by the selected model: {reason}"),
        ),
        ProviderError::InvalidRequest { reason } => HostError::invalid_argument(reason.clone()),
        ProviderError::Timeout { .. } => HostError::upstream("timed out"),
        ProviderError::Configuration { .. }
        | ProviderError::Transport { .. }
        | ProviderError::RateLimited { .. }
        | ProviderError::Response { .. } => HostError::upstream(err.to_string()),
    }
}

struct Args<'a>(&'a Map<String, Value>);

impl<'a> Args<'a> {
    fn str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn owned(&self, key: &str) -> Option<String> {
        self.str(key).map(str::to_owned)
    }

    fn required(&self, key: &str) -> Result<&'a str> {
        self.str(key)
            .ok_or_else(|| HostError::invalid_argument(format!("missing argument `{key}`")))
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn wants_json(&self) -> bool {
        self.str("response_format") == Some("json")
    }

    fn localized(&self, instruction: &str) -> String {
        match self.str("language") {
            Some(language) => format!("Respond in {language}. {instruction}"),
            None => instruction.to_owned(),
        }
    }

    fn json_shape(&self, name: &'static str, strict: bool) -> Result<ResponseShape> {
        let schema = self
            .0
            .get("json_schema")
            .cloned()
            .ok_or_else(|| HostError::invalid_argument("structured output requires `json_schema`"))?;
        Ok(ResponseShape::Json {
            name,
            schema,
            strict,
        })
    }

    fn max_output_tokens(&self) -> Option<u32> {
        self.0
            .get("max_output_tokens")
            .and_then(Value::as_u64)
            .map(|tokens| u32::try_from(tokens).unwrap_or(u32::MAX))
    }
}

fn take(payload: Option<MediaPayload>, argument: &str) -> Result<MediaPayload> {
    payload.ok_or_else(|| HostError::invalid_argument(format!("`{argument}` was not loaded")))
}

fn build_request(
    spec: &ToolSpec,
    args: &Args<'_>,
    model: String,
    inputs: OperationInputs,
) -> Result<ProviderRequest> {
    let request = match spec.kind() {
        ToolKind::ImageAnalyze => ProviderRequest::AnalyzeImage(ImageAnalysisRequest {
            model,
            instruction: args.localized(args.required("instruction")?),
            image: take(inputs.image, "image_ref")?,
            shape: if args.wants_json() {
                args.json_shape("image_analysis", true)?
            } else {
                ResponseShape::Text
            },
            max_output_tokens: args.max_output_tokens(),
            detail: args.owned("detail"),
        }),
        ToolKind::ImageExtract => ProviderRequest::AnalyzeImage(ImageAnalysisRequest {
            model,
            instruction: args.localized(args.str("instruction").unwrap_or(EXTRACT_INSTRUCTION)),
            image: take(inputs.image, "image_ref")?,
            shape: args.json_shape("image_extraction", false)?,
            max_output_tokens: args.max_output_tokens(),
            detail: args.owned("detail"),
        }),
        ToolKind::ImageToSpec => {
            let format = inputs.output_format.unwrap_or(MediaFormat::Markdown);
            let instruction = args
                .str("instruction")
                .unwrap_or_else(|| spec_instruction(format));
            ProviderRequest::AnalyzeImage(ImageAnalysisRequest {
                model,
                instruction: args.localized(instruction),
                image: take(inputs.image, "image_ref")?,
                shape: if format == MediaFormat::Json {
                    args.json_shape("image_analysis", true)?
                } else {
                    ResponseShape::Text
                },
                max_output_tokens: None,
                detail: args.owned("detail"),
            })
        }
        ToolKind::ImageGenerate => ProviderRequest::GenerateImage(ImageGenerationRequest {
            model,
            prompt: args.required("prompt")?.to_owned(),
            format: inputs.output_format.unwrap_or(MediaFormat::Png),
            size: args.owned("size"),
            background: args.owned("background"),
            quality: args.owned("quality"),
        }),
        ToolKind::ImageEdit => ProviderRequest::EditImage(ImageEditRequest {
            model,
            prompt: args.required("prompt")?.to_owned(),
            image: take(inputs.image, "image_ref")?,
            mask: inputs.mask,
            format: inputs.output_format.unwrap_or(MediaFormat::Png),
            size: args.owned("size"),
        }),
        ToolKind::AudioTranscribe => ProviderRequest::Transcribe(TranscriptionRequest {
            model,
            audio: take(inputs.audio, "audio_ref")?,
            language: args.owned("language"),
            prompt: args.owned("prompt"),
            timestamps: args.flag("timestamps"),
        }),
        ToolKind::AudioAnalyze => ProviderRequest::AnalyzeAudio(AudioAnalysisRequest {
            model,
            instruction: args.localized(args.required("instruction")?),
            audio: take(inputs.audio, "audio_ref")?,
            shape: if args.wants_json() {
                args.json_shape("audio_analysis", true)?
            } else {
                ResponseShape::Text
            },
        }),
        ToolKind::AudioTts => ProviderRequest::Speech(SpeechRequest {
            model,
            text: args.required("text")?.to_owned(),
            voice: args.str("voice").unwrap_or(DEFAULT_VOICE).to_owned(),
            format: inputs.output_format.unwrap_or(MediaFormat::Mp3),
            speed: args.0.get("speed").and_then(Value::as_f64),
            instructions: args.owned("instructions"),
        }),
        ToolKind::AudioTransform => ProviderRequest::TransformAudio(AudioTransformRequest {
            model,
            instruction: args.required("instruction")?.to_owned(),
            audio: take(inputs.audio, "audio_ref")?,
            voice: args.str("voice").unwrap_or(DEFAULT_VOICE).to_owned(),
            format: inputs.output_format.unwrap_or(MediaFormat::Mp3),
        }),
        ToolKind::MultimodalChain => {
            return Err(HostError::invalid_argument(
                "multimodal_chain runs through the chain executor",
            ));
        }
    };
    Ok(request)
}

fn spec_instruction(format: MediaFormat) -> &'static str {
    match format {
        MediaFormat::Json => {
            "Describe this image as a specification that follows the provided JSON schema."
        }
        MediaFormat::Text => "Describe this image as a detailed plain-text specification.",
        _ => "Describe this image as a detailed specification written in Markdown.",
    }
}

fn finish(
    spec: &ToolSpec,
    output: ProviderOutput,
    output_format: Option<MediaFormat>,
    schema: Option<&SchemaNode>,
) -> Result<(OperationPayload, Vec<String>)> {
    match spec.output_mode() {
        OutputMode::WritesFile => {
            let format = output_format
                .or_else(|| spec.output_formats().first().copied())
                .ok_or_else(|| HostError::upstream("output format was not resolved"))?;
            let (bytes, warnings) = match output {
                ProviderOutput::Bytes(bytes) => (bytes, Vec::new()),
                ProviderOutput::Text(text) if schema.is_none() => (Bytes::from(text), Vec::new()),
                structured => {
                    let (value, warnings) = structured_value(spec, structured, schema)?;
                    (Bytes::from(render_json(&value)?), warnings)
                }
            };
            if bytes.is_empty() {
                return Err(HostError::upstream("provider returned an empty payload"));
            }
            let sha256 = sha256_hex(&bytes);
            Ok((
                OperationPayload::Bytes {
                    bytes,
                    format,
                    sha256,
                },
                warnings,
            ))
        }
        OutputMode::Inline => {
            let (value, warnings) = match output {
                ProviderOutput::Text(text) if schema.is_none() => {
                    if spec.kind() == ToolKind::AudioTranscribe {
                        (json!({ "text": text }), Vec::new())
                    } else {
                        (Value::String(text), Vec::new())
                    }
                }
                ProviderOutput::Bytes(_) => {
                    return Err(HostError::upstream(format!(
                        "{} received binary output from the provider",
                        spec.name()
                    )));
                }
                structured => structured_value(spec, structured, schema)?,
            };
            Ok((OperationPayload::Data(value), warnings))
        }
        OutputMode::Composite => Err(HostError::invalid_argument(
            "multimodal_chain runs through the chain executor",
        )),
    }
}

fn structured_value(
    spec: &ToolSpec,
    output: ProviderOutput,
    schema: Option<&SchemaNode>,
) -> Result<(Value, Vec<String>)> {
    let value = match output {
        ProviderOutput::Json(value) => value,
        ProviderOutput::Text(text) => serde_json::from_str(&text)
            .map_err(|_| HostError::upstream("Model output was not valid JSON"))?,
        ProviderOutput::Bytes(_) => {
            return Err(HostError::upstream(format!(
                "{} received binary output from the provider",
                spec.name()
            )));
        }
    };
    let Some(schema) = schema else {
        return Ok((value, Vec::new()));
    };
    match validate(&value, schema, spec.output_validation_mode()) {
        ValidationOutcome::Valid => Ok((value, Vec::new())),
        ValidationOutcome::ValidWithWarnings(warnings) => Ok((value, warnings)),
        ValidationOutcome::Invalid(violation) => Err(HostError::schema_validation(format!(
            "{} output does not match the schema at {violation}",
            spec.name()
        ))),
    }
}

fn render_json(value: &Value) -> Result<Vec<u8>> {
    let mut rendered = serde_json::to_vec_pretty(value)
        .map_err(|err| HostError::upstream(format!("failed to render JSON output: {err}")))?;
    rendered.push(b'\n');
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modal_primitives::{ErrorCode, ModelCategory};
    use modal_tools::ToolRegistry;
    use serde_json::json;

    fn spec(kind: ToolKind) -> ToolSpec {
        ToolRegistry::builtin().get(kind).unwrap().clone()
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("arguments must be an object"),
        }
    }

    #[test]
    fn model_resolution_follows_priority() {
        let spec = spec(ToolKind::ImageEdit);
        let mut models = ModelSettings::default();

        let (model, source) = resolve_model(&spec, &Map::new(), &models).unwrap();
        assert_eq!((model.as_str(), source), ("gpt-image-1", ModelSource::Default));

        models.set_category_model(ModelCategory::Image, "dall-e-2");
        let (model, source) = resolve_model(&spec, &Map::new(), &models).unwrap();
        assert_eq!((model.as_str(), source), ("dall-e-2", ModelSource::CategoryConfig));

        models.set_tool_model("image_edit", "gpt-image-1-mini");
        let (model, source) = resolve_model(&spec, &Map::new(), &models).unwrap();
        assert_eq!((model.as_str(), source), ("gpt-image-1-mini", ModelSource::ToolConfig));

        let explicit = args(json!({"model": "custom"}));
        let (model, source) = resolve_model(&spec, &explicit, &models).unwrap();
        assert_eq!((model.as_str(), source), ("custom", ModelSource::Argument));
    }

    #[test]
    fn chain_has_no_model() {
        let spec = spec(ToolKind::MultimodalChain);
        assert!(resolve_model(&spec, &Map::new(), &ModelSettings::default()).is_none());
    }

    #[test]
    fn provider_errors_are_translated() {
        let cases = [
            (
                ProviderError::unsupported(Capability::General, "no audio input"),
                ErrorCode::UnsupportedFormat,
            ),
            (
                ProviderError::unsupported(Capability::SpeechToSpeech, "text only"),
                ErrorCode::UnsupportedTransformation,
            ),
            (ProviderError::invalid_request("bad size"), ErrorCode::InvalidArgument),
            (ProviderError::transport("reset"), ErrorCode::UpstreamError),
            (
                ProviderError::RateLimited { retry_after: None },
                ErrorCode::UpstreamError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(map_provider_error(&err).code(), code);
        }

        let timeout = ProviderError::Timeout {
            after: Duration::from_secs(90),
        };
        assert_eq!(map_provider_error(&timeout).message(), "timed out");

        let masked = ProviderError::unsupported(Capability::MaskedEdit, "mask ignored");
        assert!(map_provider_error(&masked).message().contains("masked editing"));
    }

    #[test]
    fn language_prefixes_instruction() {
        let map = args(json!({"language": "French"}));
        assert_eq!(Args(&map).localized("Describe it."), "Respond in French. Describe it.");
    }

    #[test]
    fn json_specs_are_pretty_printed_with_newline() {
        let spec = spec(ToolKind::ImageToSpec);
        let (payload, _) = finish(
            &spec,
            ProviderOutput::Json(json!({"title": "cat"})),
            Some(MediaFormat::Json),
            Some(&SchemaNode::Any),
        )
        .unwrap();
        let OperationPayload::Bytes { bytes, sha256, .. } = payload else {
            panic!("expected bytes");
        };
        assert_eq!(bytes, Bytes::from("{\n  \"title\": \"cat\"\n}\n"));
        assert_eq!(sha256, sha256_hex(&bytes));
        assert_eq!(sha256.len(), 64);
    }

    #[test]
    fn markdown_specs_are_written_verbatim() {
        let spec = spec(ToolKind::ImageToSpec);
        let (payload, _) = finish(
            &spec,
            ProviderOutput::Text("# Cat\n".to_owned()),
            Some(MediaFormat::Markdown),
            None,
        )
        .unwrap();
        assert!(matches!(
            payload,
            OperationPayload::Bytes { ref bytes, format: MediaFormat::Markdown, .. } if bytes == "# Cat\n"
        ));
    }

    #[test]
    fn strict_outputs_reject_missing_fields() {
        let spec = spec(ToolKind::ImageAnalyze);
        let schema = SchemaNode::from_json(&json!({
            "type": "object",
            "required": ["label"],
            "properties": {"label": {"type": "string"}}
        }))
        .unwrap();
        let err = finish(
            &spec,
            ProviderOutput::Json(json!({})),
            None,
            Some(&schema),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaValidationFailed);
    }

    #[test]
    fn partial_outputs_surface_warnings() {
        let spec = spec(ToolKind::ImageExtract);
        let schema = SchemaNode::from_json(&json!({
            "type": "object",
            "required": ["label"],
            "properties": {"label": {"type": "string"}}
        }))
        .unwrap();
        let (payload, warnings) = finish(
            &spec,
            ProviderOutput::Text("{}".to_owned()),
            None,
            Some(&schema),
        )
        .unwrap();
        assert_eq!(payload, OperationPayload::Data(json!({})));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn prose_where_json_was_required_is_upstream() {
        let spec = spec(ToolKind::ImageExtract);
        let err = finish(
            &spec,
            ProviderOutput::Text("sorry".to_owned()),
            None,
            Some(&SchemaNode::Any),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UpstreamError);
        assert_eq!(err.message(), "Model output was not valid JSON");
    }
}
