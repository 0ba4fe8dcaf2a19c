//! Model categories used to select a backing model per tool.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Family of provider models a tool delegates to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    /// Vision-capable text models.
    Vision,
    /// Image generation and editing models.
    Image,
    /// Speech-to-text models.
    Transcription,
    /// Text-to-speech models.
    Speech,
    /// Audio-capable chat models (audio input and output).
    Audio,
}

impl ModelCategory {
    /// All categories in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Vision,
        Self::Image,
        Self::Transcription,
        Self::Speech,
        Self::Audio,
    ];

    /// Returns the suffix used in `OPENAI_MODEL_<SUFFIX>` configuration keys.
    #[must_use]
    pub const fn config_suffix(self) -> &'static str {
        match self {
            Self::Vision => "VISION",
            Self::Image => "IMAGE",
            Self::Transcription => "STT",
            Self::Speech => "TTS",
            Self::Audio => "AUDIO",
        }
    }

    /// Returns the built-in model used when nothing else is configured.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Vision => "gpt-4o-mini",
            Self::Image => "gpt-image-1",
            Self::Transcription => "whisper-1",
            Self::Speech => "gpt-4o-mini-tts",
            Self::Audio => "gpt-4o-audio-preview",
        }
    }
}

impl fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vision => "vision",
            Self::Image => "image",
            Self::Transcription => "transcription",
            Self::Speech => "speech",
            Self::Audio => "audio",
        })
    }
}
