//! Content classification by magic bytes.
//!
//! Only the leading bytes are inspected. Declared MIME types and file
//! extensions are never consulted here.

use serde::Serialize;
use std::fmt;

const PDF_MAGIC: &[u8] = b"%PDF";
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];
const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Bytes shown in logs when an artifact can't be classified
const HEADER_PREVIEW_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Png,
    Jpeg,
    Unknown,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentKind::Pdf => "PDF",
            ContentKind::Png => "PNG",
            ContentKind::Jpeg => "JPEG",
            ContentKind::Unknown => "unknown",
        })
    }
}

/// Classify raw bytes. Never fails; short or unrecognised input is `Unknown`.
pub fn classify(bytes: &[u8]) -> ContentKind {
    if bytes.starts_with(PDF_MAGIC) {
        ContentKind::Pdf
    } else if bytes.starts_with(PNG_MAGIC) {
        ContentKind::Png
    } else if bytes.starts_with(JPEG_SOI) && bytes.get(3).is_some_and(|&m| is_jpeg_lead_marker(m))
    {
        ContentKind::Jpeg
    } else {
        ContentKind::Unknown
    }
}

/// Markers that may directly follow SOI: APP0-APP15 (JFIF, Exif, ICC, Adobe, ...)
/// and DQT for encoders that skip the application segment.
fn is_jpeg_lead_marker(marker: u8) -> bool {
    matches!(marker, 0xE0..=0xEF | 0xDB)
}

/// Hex dump of the first few bytes
pub fn header_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(HEADER_PREVIEW_LEN)
        .map(|b| format!("{:02x}", b))
        .collect()
}
