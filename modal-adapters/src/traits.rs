//! Provider-neutral requests, outputs and the adapter trait.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use modal_primitives::MediaFormat;
use serde_json::Value;
use thiserror::Error;

/// Result alias used by provider adapters.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capability a provider reported as unsupported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Any capability not covered by a named sub-case.
    General,
    /// Producing speech from input speech.
    SpeechToSpeech,
    /// Editing an image restricted by a mask.
    MaskedEdit,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::General => "general",
            Self::SpeechToSpeech => "speech-to-speech",
            Self::MaskedEdit => "masked editing",
        })
    }
}

/// Error type shared by adapter implementations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Adapter is misconfigured or missing credentials.
    #[error("provider not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The provider rejected the shape of the request.
    #[error("invalid provider request: {reason}")]
    InvalidRequest {
        /// Reason reported by the provider.
        reason: String,
    },

    /// Network or protocol failure.
    #[error("provider transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("provider call timed out after {after:?}")]
    Timeout {
        /// Timeout that elapsed.
        after: Duration,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("provider rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The provider returned an error status or an unusable body.
    #[error("provider response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },

    /// The selected model cannot perform the request.
    #[error("{capability} capability unsupported: {reason}")]
    Unsupported {
        /// Which capability was refused.
        capability: Capability,
        /// Reason reported by the provider.
        reason: String,
    },
}

impl ProviderError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for rejected request shapes.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for unusable responses.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for unsupported capabilities.
    #[must_use]
    pub fn unsupported(capability: Capability, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            capability,
            reason: reason.into(),
        }
    }
}

/// Minimal metadata describing an adapter instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
}

impl AdapterMetadata {
    /// Creates metadata for the supplied provider identifier.
    #[must_use]
    pub const fn new(provider: &'static str) -> Self {
        Self { provider }
    }

    /// Returns the provider identifier (e.g., "openai").
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }
}

/// Binary input handed to the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPayload {
    /// Raw bytes.
    pub bytes: Bytes,
    /// Detected or declared format.
    pub format: MediaFormat,
}

impl MediaPayload {
    /// Wraps bytes with their format.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, format: MediaFormat) -> Self {
        Self {
            bytes: bytes.into(),
            format,
        }
    }

    /// Returns a file name suitable for multipart uploads.
    #[must_use]
    pub fn file_name(&self, stem: &str) -> String {
        let ext = match self.format {
            MediaFormat::Jpeg => "jpg",
            MediaFormat::Markdown => "md",
            MediaFormat::Text => "txt",
            other => other.as_str(),
        };
        format!("{stem}.{ext}")
    }
}

/// Requested shape of a text response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseShape {
    /// Free-form text.
    Text,
    /// JSON constrained by a schema.
    Json {
        /// Schema name reported to the provider.
        name: &'static str,
        /// JSON Schema document.
        schema: Value,
        /// Ask the provider to enforce the schema exactly.
        strict: bool,
    },
}

/// Vision request: instruction plus one image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageAnalysisRequest {
    /// Model identifier.
    pub model: String,
    /// Instruction, already prefixed with any language directive.
    pub instruction: String,
    /// Image to analyze.
    pub image: MediaPayload,
    /// Text or JSON output.
    pub shape: ResponseShape,
    /// Output token ceiling.
    pub max_output_tokens: Option<u32>,
    /// Vision detail level.
    pub detail: Option<String>,
}

/// Image generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageGenerationRequest {
    /// Model identifier.
    pub model: String,
    /// Prompt text.
    pub prompt: String,
    /// Output encoding.
    pub format: MediaFormat,
    /// Pixel size, e.g. `1024x1024`.
    pub size: Option<String>,
    /// Background mode.
    pub background: Option<String>,
    /// Quality tier.
    pub quality: Option<String>,
}

/// Image edit request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageEditRequest {
    /// Model identifier.
    pub model: String,
    /// Edit instruction.
    pub prompt: String,
    /// Source image.
    pub image: MediaPayload,
    /// Optional PNG mask with the same dimensions as the source.
    pub mask: Option<MediaPayload>,
    /// Output encoding.
    pub format: MediaFormat,
    /// Pixel size.
    pub size: Option<String>,
}

/// Speech-to-text request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptionRequest {
    /// Model identifier.
    pub model: String,
    /// Audio to transcribe.
    pub audio: MediaPayload,
    /// ISO language hint.
    pub language: Option<String>,
    /// Prompt biasing the transcript.
    pub prompt: Option<String>,
    /// Include segment timestamps.
    pub timestamps: bool,
}

/// Audio question-answering request.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioAnalysisRequest {
    /// Model identifier.
    pub model: String,
    /// Instruction, already prefixed with any language directive.
    pub instruction: String,
    /// WAV or MP3 clip.
    pub audio: MediaPayload,
    /// Text or JSON output.
    pub shape: ResponseShape,
}

/// Text-to-speech request.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    /// Model identifier.
    pub model: String,
    /// Text to speak.
    pub text: String,
    /// Voice name.
    pub voice: String,
    /// Output encoding.
    pub format: MediaFormat,
    /// Playback speed multiplier.
    pub speed: Option<f64>,
    /// Delivery instructions (tone, pacing).
    pub instructions: Option<String>,
}

/// Speech-to-speech request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioTransformRequest {
    /// Model identifier.
    pub model: String,
    /// What to do with the input audio.
    pub instruction: String,
    /// WAV or MP3 clip.
    pub audio: MediaPayload,
    /// Voice name.
    pub voice: String,
    /// Output encoding.
    pub format: MediaFormat,
}

/// One provider call.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderRequest {
    /// Vision analysis.
    AnalyzeImage(ImageAnalysisRequest),
    /// Image generation.
    GenerateImage(ImageGenerationRequest),
    /// Image editing.
    EditImage(ImageEditRequest),
    /// Transcription.
    Transcribe(TranscriptionRequest),
    /// Audio analysis.
    AnalyzeAudio(AudioAnalysisRequest),
    /// Speech synthesis.
    Speech(SpeechRequest),
    /// Speech-to-speech transformation.
    TransformAudio(AudioTransformRequest),
}

impl ProviderRequest {
    /// Returns the model the request targets.
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::AnalyzeImage(request) => &request.model,
            Self::GenerateImage(request) => &request.model,
            Self::EditImage(request) => &request.model,
            Self::Transcribe(request) => &request.model,
            Self::AnalyzeAudio(request) => &request.model,
            Self::Speech(request) => &request.model,
            Self::TransformAudio(request) => &request.model,
        }
    }

    /// Returns a short operation label for logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::AnalyzeImage(_) => "analyze_image",
            Self::GenerateImage(_) => "generate_image",
            Self::EditImage(_) => "edit_image",
            Self::Transcribe(_) => "transcribe",
            Self::AnalyzeAudio(_) => "analyze_audio",
            Self::Speech(_) => "speech",
            Self::TransformAudio(_) => "transform_audio",
        }
    }
}

/// Result of one provider call.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderOutput {
    /// Binary artifact (image or audio).
    Bytes(Bytes),
    /// Free-form text.
    Text(String),
    /// Structured JSON.
    Json(Value),
}

/// Trait implemented by every inference provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns metadata describing the adapter instance.
    fn metadata(&self) -> &AdapterMetadata;

    /// Performs exactly one provider call.
    async fn execute(&self, request: ProviderRequest) -> ProviderResult<ProviderOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_file_names_use_conventional_extensions() {
        let payload = MediaPayload::new(vec![1, 2, 3], MediaFormat::Jpeg);
        assert_eq!(payload.file_name("image"), "image.jpg");
        let payload = MediaPayload::new(Vec::new(), MediaFormat::Wav);
        assert_eq!(payload.file_name("audio"), "audio.wav");
    }

    #[test]
    fn unsupported_errors_name_the_capability() {
        let err = ProviderError::unsupported(Capability::MaskedEdit, "mask not allowed");
        assert_eq!(
            err.to_string(),
            "masked editing capability unsupported: mask not allowed"
        );
    }
}
