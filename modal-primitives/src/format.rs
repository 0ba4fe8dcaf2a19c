//! Media formats understood by the host.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::HostError;

/// Broad family a [`MediaFormat`] belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Raster images.
    Image,
    /// Encoded or raw audio.
    Audio,
    /// Text documents (markdown, JSON, plain text).
    Document,
}

/// Concrete file format of an input or output artifact.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// PNG image.
    Png,
    /// JPEG image.
    Jpeg,
    /// WebP image.
    Webp,
    /// GIF image (input only).
    Gif,
    /// MP3 audio.
    Mp3,
    /// WAV audio.
    Wav,
    /// Opus audio.
    Opus,
    /// AAC audio.
    Aac,
    /// FLAC audio.
    Flac,
    /// Raw 16-bit PCM audio.
    Pcm,
    /// M4A audio (input only).
    M4a,
    /// Ogg audio (input only).
    Ogg,
    /// `WebM` audio (input only).
    Webm,
    /// Markdown document.
    Markdown,
    /// JSON document.
    Json,
    /// Plain text document.
    Text,
}

impl MediaFormat {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Pcm => "pcm",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
            Self::Webm => "webm",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Text => "text",
        }
    }

    /// Returns the family this format belongs to.
    #[must_use]
    pub const fn kind(self) -> MediaKind {
        match self {
            Self::Png | Self::Jpeg | Self::Webp | Self::Gif => MediaKind::Image,
            Self::Mp3
            | Self::Wav
            | Self::Opus
            | Self::Aac
            | Self::Flac
            | Self::Pcm
            | Self::M4a
            | Self::Ogg
            | Self::Webm => MediaKind::Audio,
            Self::Markdown | Self::Json | Self::Text => MediaKind::Document,
        }
    }

    /// Returns the MIME type used when uploading the artifact.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Opus => "audio/opus",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Pcm => "audio/pcm",
            Self::M4a => "audio/mp4",
            Self::Ogg => "audio/ogg",
            Self::Webm => "audio/webm",
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }

    /// Maps a file extension (without the dot, any case) to a format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = match ext.to_ascii_lowercase().as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "webp" => Self::Webp,
            "gif" => Self::Gif,
            "mp3" => Self::Mp3,
            "wav" => Self::Wav,
            "opus" => Self::Opus,
            "aac" => Self::Aac,
            "flac" => Self::Flac,
            "pcm" => Self::Pcm,
            "m4a" => Self::M4a,
            "ogg" => Self::Ogg,
            "webm" => Self::Webm,
            "md" | "markdown" => Self::Markdown,
            "json" => Self::Json,
            "txt" | "text" => Self::Text,
            _ => return None,
        };
        Some(format)
    }

    /// Infers the format from the extension of a path or URL reference.
    ///
    /// Query strings and fragments are ignored so presigned URLs resolve to
    /// the extension of their object key.
    #[must_use]
    pub fn from_reference(reference: &str) -> Option<Self> {
        let path = reference
            .split(['?', '#'])
            .next()
            .unwrap_or(reference);
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Self::from_extension(ext)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFormat {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim())
            .ok_or_else(|| HostError::invalid_argument(format!("unknown format `{s}`")))
    }
}
