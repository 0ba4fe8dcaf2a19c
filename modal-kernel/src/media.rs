//! Format sniffing and header-level dimension probing.

use modal_primitives::{HostError, MediaFormat, MediaKind, Result};

/// Detects a format from leading magic bytes.
#[must_use]
pub fn sniff(bytes: &[u8]) -> Option<MediaFormat> {
    let format = match bytes {
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => MediaFormat::Png,
        [0xFF, 0xD8, 0xFF, ..] => MediaFormat::Jpeg,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => MediaFormat::Webp,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => MediaFormat::Wav,
        [b'G', b'I', b'F', b'8', ..] => MediaFormat::Gif,
        [b'I', b'D', b'3', ..] => MediaFormat::Mp3,
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => MediaFormat::Mp3,
        [b'f', b'L', b'a', b'C', ..] => MediaFormat::Flac,
        [b'O', b'g', b'g', b'S', ..] => MediaFormat::Ogg,
        [0x1A, 0x45, 0xDF, 0xA3, ..] => MediaFormat::Webm,
        _ => return None,
    };
    Some(format)
}

/// Determines the format of an input, preferring its content over the
/// extension of `reference`.
///
/// # Errors
///
/// Returns `UNSUPPORTED_FORMAT` when neither source identifies a format of
/// the expected `kind`.
pub fn detect_input(reference: &str, bytes: &[u8], kind: MediaKind) -> Result<MediaFormat> {
    let format = sniff(bytes)
        .or_else(|| MediaFormat::from_reference(reference))
        .ok_or_else(|| {
            HostError::unsupported_format(format!("cannot determine the format of `{reference}`"))
        })?;
    if format.kind() != kind {
        return Err(HostError::unsupported_format(format!(
            "`{reference}` is {format}, expected {} input",
            kind_label(kind)
        )));
    }
    Ok(format)
}

/// Restricts audio inputs to WAV and MP3.
///
/// # Errors
///
/// Returns `UNSUPPORTED_FORMAT` for any other encoding.
pub fn require_wav_or_mp3(reference: &str, format: MediaFormat) -> Result<()> {
    match format {
        MediaFormat::Wav | MediaFormat::Mp3 => Ok(()),
        other => Err(HostError::unsupported_format(format!(
            "`{reference}` is {other}; only wav and mp3 audio are accepted"
        ))),
    }
}

/// Checks that a mask is a PNG with the same pixel dimensions as the image.
///
/// # Errors
///
/// Returns `UNSUPPORTED_FORMAT` when the mask is not PNG and
/// `INVALID_ARGUMENT` when dimensions differ or cannot be read.
pub fn check_mask(
    image: &[u8],
    image_format: MediaFormat,
    mask: &[u8],
    mask_format: MediaFormat,
) -> Result<()> {
    if mask_format != MediaFormat::Png {
        return Err(HostError::unsupported_format(format!(
            "mask must be png, got {mask_format}"
        )));
    }
    let image_size = dimensions(image, image_format)
        .ok_or_else(|| HostError::invalid_argument("cannot read the source image dimensions"))?;
    let mask_size = dimensions(mask, mask_format)
        .ok_or_else(|| HostError::invalid_argument("cannot read the mask dimensions"))?;
    if image_size != mask_size {
        return Err(HostError::invalid_argument(format!(
            "mask is {}x{} but the image is {}x{}",
            mask_size.0, mask_size.1, image_size.0, image_size.1
        )));
    }
    Ok(())
}

/// Reads `(width, height)` from PNG, JPEG or WebP headers.
#[must_use]
pub fn dimensions(bytes: &[u8], format: MediaFormat) -> Option<(u32, u32)> {
    match format {
        MediaFormat::Png => png_dimensions(bytes),
        MediaFormat::Jpeg => jpeg_dimensions(bytes),
        MediaFormat::Webp => webp_dimensions(bytes),
        _ => None,
    }
}

fn kind_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image",
        MediaKind::Audio => "audio",
        MediaKind::Document => "document",
    }
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(raw))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
    Some(u16::from_le_bytes(raw))
}

fn le_u24(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 3)?;
    Some(u32::from(raw[0]) | (u32::from(raw[1]) << 8) | (u32::from(raw[2]) << 16))
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    Some((be_u32(bytes, 16)?, be_u32(bytes, 20)?))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut at = 2;
    loop {
        while *bytes.get(at)? != 0xFF {
            at += 1;
        }
        while *bytes.get(at)? == 0xFF {
            at += 1;
        }
        let marker = *bytes.get(at)?;
        at += 1;
        match marker {
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => return None,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let height = be_u16(bytes, at + 3)?;
                let width = be_u16(bytes, at + 5)?;
                return Some((u32::from(width), u32::from(height)));
            }
            _ => {
                let length = usize::from(be_u16(bytes, at)?);
                at += length;
            }
        }
    }
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match bytes.get(12..16)? {
        b"VP8 " => {
            if bytes.get(23..26)? != [0x9D, 0x01, 0x2A] {
                return None;
            }
            let width = le_u16(bytes, 26)? & 0x3FFF;
            let height = le_u16(bytes, 28)? & 0x3FFF;
            Some((u32::from(width), u32::from(height)))
        }
        b"VP8L" => {
            if *bytes.get(20)? != 0x2F {
                return None;
            }
            let b = bytes.get(21..25)?;
            let width = 1 + ((u32::from(b[1] & 0x3F) << 8) | u32::from(b[0]));
            let height = 1
                + ((u32::from(b[3] & 0x0F) << 10)
                    | (u32::from(b[2]) << 2)
                    | (u32::from(b[1] & 0xC0) >> 6));
            Some((width, height))
        }
        b"VP8X" => Some((1 + le_u24(bytes, 24)?, 1 + le_u24(bytes, 27)?)),
        _ => None,
    }
}
