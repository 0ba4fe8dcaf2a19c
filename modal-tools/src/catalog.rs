//! Static tool catalog.

use modal_primitives::{ErrorCode, MediaFormat, ModelCategory};
use modal_schema::{ArraySchema, ObjectSchema, SchemaNode};

use crate::kind::ToolKind;
use crate::spec::{OutputMode, ToolSpec};

const IMAGE_OUTPUTS: [MediaFormat; 3] = [MediaFormat::Png, MediaFormat::Jpeg, MediaFormat::Webp];
const SPEECH_OUTPUTS: [MediaFormat; 6] = [
    MediaFormat::Mp3,
    MediaFormat::Opus,
    MediaFormat::Aac,
    MediaFormat::Flac,
    MediaFormat::Wav,
    MediaFormat::Pcm,
];
const TRANSFORM_OUTPUTS: [MediaFormat; 5] = [
    MediaFormat::Mp3,
    MediaFormat::Wav,
    MediaFormat::Flac,
    MediaFormat::Opus,
    MediaFormat::Pcm,
];
const SPEC_OUTPUTS: [MediaFormat; 3] = [MediaFormat::Markdown, MediaFormat::Json, MediaFormat::Text];

/// Builds every tool spec in catalog order.
#[must_use]
pub fn builtin_specs() -> Vec<ToolSpec> {
    ToolKind::ALL.into_iter().map(spec_for).collect()
}

pub(crate) fn spec_for(kind: ToolKind) -> ToolSpec {
    match kind {
        ToolKind::ImageAnalyze => ToolSpec {
            kind,
            description: "Answer an instruction about an image as text or schema-checked JSON",
            input: ObjectSchema::new()
                .field("image_ref", reference(), true)
                .field("instruction", SchemaNode::non_empty_string(), true)
                .field("response_format", SchemaNode::string_enum(&["text", "json"]), false)
                .field("json_schema", schema_document(), false)
                .field("max_output_tokens", SchemaNode::integer_at_least(1), false)
                .field("detail", detail(), false)
                .field("language", SchemaNode::non_empty_string(), false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::Inline,
            error_codes: inline_codes(true),
            category: Some(ModelCategory::Vision),
            allows_partial: false,
            output_formats: Vec::new(),
        },
        ToolKind::ImageExtract => ToolSpec {
            kind,
            description: "Extract structured data from an image; missing fields become warnings",
            input: ObjectSchema::new()
                .field("image_ref", reference(), true)
                .field("json_schema", schema_document(), true)
                .field("instruction", SchemaNode::non_empty_string(), false)
                .field("max_output_tokens", SchemaNode::integer_at_least(1), false)
                .field("detail", detail(), false)
                .field("language", SchemaNode::non_empty_string(), false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::Inline,
            error_codes: inline_codes(true),
            category: Some(ModelCategory::Vision),
            allows_partial: true,
            output_formats: Vec::new(),
        },
        ToolKind::ImageToSpec => ToolSpec {
            kind,
            description: "Write a markdown, JSON or text specification derived from an image",
            input: ObjectSchema::new()
                .field("image_ref", reference(), true)
                .field("output_ref", reference(), true)
                .field("format", SchemaNode::string_enum(&["markdown", "json", "text"]), false)
                .field("instruction", SchemaNode::non_empty_string(), false)
                .field("json_schema", schema_document(), false)
                .field("detail", detail(), false)
                .field("language", SchemaNode::non_empty_string(), false)
                .field("overwrite", SchemaNode::Boolean, false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::WritesFile,
            error_codes: file_codes(&[ErrorCode::SchemaValidationFailed]),
            category: Some(ModelCategory::Vision),
            allows_partial: false,
            output_formats: SPEC_OUTPUTS.to_vec(),
        },
        ToolKind::ImageGenerate => ToolSpec {
            kind,
            description: "Generate an image from a prompt",
            input: ObjectSchema::new()
                .field("prompt", SchemaNode::non_empty_string(), true)
                .field("output_ref", reference(), true)
                .field("format", SchemaNode::string_enum(&["png", "jpeg", "webp"]), false)
                .field("size", SchemaNode::non_empty_string(), false)
                .field(
                    "background",
                    SchemaNode::string_enum(&["transparent", "opaque", "auto"]),
                    false,
                )
                .field(
                    "quality",
                    SchemaNode::string_enum(&["low", "medium", "high", "auto"]),
                    false,
                )
                .field("overwrite", SchemaNode::Boolean, false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::WritesFile,
            error_codes: file_codes(&[]),
            category: Some(ModelCategory::Image),
            allows_partial: false,
            output_formats: IMAGE_OUTPUTS.to_vec(),
        },
        ToolKind::ImageEdit => ToolSpec {
            kind,
            description: "Edit an image from a prompt, optionally restricted by a PNG mask",
            input: ObjectSchema::new()
                .field("image_ref", reference(), true)
                .field("prompt", SchemaNode::non_empty_string(), true)
                .field("output_ref", reference(), true)
                .field("mask_ref", reference(), false)
                .field("format", SchemaNode::string_enum(&["png", "jpeg", "webp"]), false)
                .field("size", SchemaNode::non_empty_string(), false)
                .field("overwrite", SchemaNode::Boolean, false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::WritesFile,
            error_codes: file_codes(&[ErrorCode::UnsupportedTransformation]),
            category: Some(ModelCategory::Image),
            allows_partial: false,
            output_formats: IMAGE_OUTPUTS.to_vec(),
        },
        ToolKind::AudioTranscribe => ToolSpec {
            kind,
            description: "Transcribe speech, optionally with segment timestamps",
            input: ObjectSchema::new()
                .field("audio_ref", reference(), true)
                .field("language", SchemaNode::non_empty_string(), false)
                .field("prompt", SchemaNode::string(), false)
                .field("timestamps", SchemaNode::Boolean, false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::Inline,
            error_codes: inline_codes(false),
            category: Some(ModelCategory::Transcription),
            allows_partial: false,
            output_formats: Vec::new(),
        },
        ToolKind::AudioAnalyze => ToolSpec {
            kind,
            description: "Answer an instruction about a WAV or MP3 clip",
            input: ObjectSchema::new()
                .field("audio_ref", reference(), true)
                .field("instruction", SchemaNode::non_empty_string(), true)
                .field("response_format", SchemaNode::string_enum(&["text", "json"]), false)
                .field("json_schema", schema_document(), false)
                .field("language", SchemaNode::non_empty_string(), false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::Inline,
            error_codes: inline_codes(true),
            category: Some(ModelCategory::Audio),
            allows_partial: false,
            output_formats: Vec::new(),
        },
        ToolKind::AudioTts => ToolSpec {
            kind,
            description: "Synthesize speech from text",
            input: ObjectSchema::new()
                .field("text", SchemaNode::non_empty_string(), true)
                .field("output_ref", reference(), true)
                .field("voice", SchemaNode::non_empty_string(), false)
                .field(
                    "format",
                    SchemaNode::string_enum(&["mp3", "opus", "aac", "flac", "wav", "pcm"]),
                    false,
                )
                .field("speed", SchemaNode::number_range(0.25, 4.0), false)
                .field("instructions", SchemaNode::string(), false)
                .field("overwrite", SchemaNode::Boolean, false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::WritesFile,
            error_codes: file_codes(&[]),
            category: Some(ModelCategory::Speech),
            allows_partial: false,
            output_formats: SPEECH_OUTPUTS.to_vec(),
        },
        ToolKind::AudioTransform => ToolSpec {
            kind,
            description: "Produce new speech from a WAV or MP3 clip and an instruction",
            input: ObjectSchema::new()
                .field("audio_ref", reference(), true)
                .field("instruction", SchemaNode::non_empty_string(), true)
                .field("output_ref", reference(), true)
                .field("voice", SchemaNode::non_empty_string(), false)
                .field(
                    "format",
                    SchemaNode::string_enum(&["mp3", "wav", "flac", "opus", "pcm"]),
                    false,
                )
                .field("overwrite", SchemaNode::Boolean, false)
                .field("model", model(), false)
                .closed()
                .into(),
            output_mode: OutputMode::WritesFile,
            error_codes: file_codes(&[ErrorCode::UnsupportedTransformation]),
            category: Some(ModelCategory::Audio),
            allows_partial: false,
            output_formats: TRANSFORM_OUTPUTS.to_vec(),
        },
        ToolKind::MultimodalChain => ToolSpec {
            kind,
            description: "Run tools in order, passing results between steps through symbols",
            input: ObjectSchema::new()
                .field("steps", chain_steps(), true)
                .field("final_output_ref", reference(), false)
                .field("final_symbol", SchemaNode::non_empty_string(), false)
                .field("overwrite", SchemaNode::Boolean, false)
                .closed()
                .into(),
            output_mode: OutputMode::Composite,
            error_codes: vec![
                ErrorCode::InvalidArgument,
                ErrorCode::NotFound,
                ErrorCode::PermissionDenied,
                ErrorCode::AlreadyExists,
                ErrorCode::PayloadTooLarge,
                ErrorCode::ChainStepFailed,
                ErrorCode::UpstreamError,
            ],
            category: None,
            allows_partial: false,
            output_formats: Vec::new(),
        },
    }
}

fn reference() -> SchemaNode {
    SchemaNode::non_empty_string()
}

fn model() -> SchemaNode {
    SchemaNode::non_empty_string()
}

fn detail() -> SchemaNode {
    SchemaNode::string_enum(&["low", "high", "auto"])
}

fn schema_document() -> SchemaNode {
    ObjectSchema::new().into()
}

fn chain_steps() -> SchemaNode {
    let step = ObjectSchema::new()
        .field("tool", SchemaNode::non_empty_string(), true)
        .field("arguments", ObjectSchema::new().into(), false)
        .field("output_symbol", SchemaNode::non_empty_string(), false)
        .closed();
    SchemaNode::Array(ArraySchema {
        items: Some(Box::new(step.into())),
        min_items: Some(1),
        max_items: None,
    })
}

fn base_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::InvalidArgument,
        ErrorCode::NotFound,
        ErrorCode::PermissionDenied,
        ErrorCode::PayloadTooLarge,
        ErrorCode::UnsupportedFormat,
        ErrorCode::UpstreamError,
    ]
}

fn inline_codes(structured: bool) -> Vec<ErrorCode> {
    let mut codes = base_codes();
    if structured {
        codes.push(ErrorCode::SchemaValidationFailed);
    }
    codes
}

fn file_codes(extra: &[ErrorCode]) -> Vec<ErrorCode> {
    let mut codes = base_codes();
    codes.push(ErrorCode::AlreadyExists);
    codes.extend_from_slice(extra);
    codes
}
