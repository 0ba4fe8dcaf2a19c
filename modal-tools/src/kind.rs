//! Closed set of tools the host can dispatch.

use std::fmt;
use std::str::FromStr;

use modal_primitives::HostError;
use serde::{Deserialize, Serialize};

/// Every tool the host knows about.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Describe or answer questions about an image.
    ImageAnalyze,
    /// Extract structured data from an image.
    ImageExtract,
    /// Turn an image into a written specification file.
    ImageToSpec,
    /// Generate an image from a prompt.
    ImageGenerate,
    /// Edit an image, optionally constrained by a mask.
    ImageEdit,
    /// Transcribe speech to text.
    AudioTranscribe,
    /// Answer questions about an audio clip.
    AudioAnalyze,
    /// Synthesize speech from text.
    AudioTts,
    /// Produce new audio from input audio and an instruction.
    AudioTransform,
    /// Run several tools in sequence.
    MultimodalChain,
}

impl ToolKind {
    /// All tools in catalog order.
    pub const ALL: [Self; 10] = [
        Self::ImageAnalyze,
        Self::ImageExtract,
        Self::ImageToSpec,
        Self::ImageGenerate,
        Self::ImageEdit,
        Self::AudioTranscribe,
        Self::AudioAnalyze,
        Self::AudioTts,
        Self::AudioTransform,
        Self::MultimodalChain,
    ];

    /// Returns the stable wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ImageAnalyze => "image_analyze",
            Self::ImageExtract => "image_extract",
            Self::ImageToSpec => "image_to_spec",
            Self::ImageGenerate => "image_generate",
            Self::ImageEdit => "image_edit",
            Self::AudioTranscribe => "audio_transcribe",
            Self::AudioAnalyze => "audio_analyze",
            Self::AudioTts => "audio_tts",
            Self::AudioTransform => "audio_transform",
            Self::MultimodalChain => "multimodal_chain",
        }
    }

    /// Looks a tool up by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Returns `true` for the composite chain tool.
    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::MultimodalChain)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| HostError::not_found(format!("unknown tool `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modal_primitives::ErrorCode;

    #[test]
    fn names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(
            "video_generate".parse::<ToolKind>().unwrap_err().code(),
            ErrorCode::NotFound
        );
    }
}
