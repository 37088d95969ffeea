//! Text encoding for the standard Helvetica font.
//!
//! Standard 14 fonts are drawn with WinAnsiEncoding, which covers ASCII,
//! Latin-1 and a handful of typographic characters. Names containing
//! anything else are rendered with those characters stripped.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("character {ch:?} cannot be encoded with WinAnsiEncoding")]
pub struct UnencodableChar {
    pub ch: char,
}

/// A label ready to be written into a content stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLabel {
    /// Text that will actually appear on the page
    pub text: String,
    pub bytes: Vec<u8>,
    /// True when characters had to be dropped
    pub degraded: bool,
}

/// Encode `text` exactly, falling back to its printable-ASCII subset when
/// any character is outside WinAnsiEncoding.
pub fn encode_label(text: &str) -> EncodedLabel {
    match encode_win_ansi(text) {
        Ok(bytes) => EncodedLabel {
            text: text.to_string(),
            bytes,
            degraded: false,
        },
        Err(_) => {
            let fallback = ascii_fallback(text);
            let bytes = fallback.as_bytes().to_vec();
            EncodedLabel {
                text: fallback,
                bytes,
                degraded: true,
            }
        }
    }
}

/// Strip every non-ASCII character (and ASCII control characters, which no
/// standard font can draw).
pub fn ascii_fallback(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>, UnencodableChar> {
    text.chars()
        .map(|ch| win_ansi_byte(ch).ok_or(UnencodableChar { ch }))
        .collect()
}

fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => Some(match ch {
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => return None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_exact() {
        let label = encode_label("Author");
        assert!(!label.degraded);
        assert_eq!(label.bytes, b"Author");
    }

    #[test]
    fn test_latin1_is_exact() {
        let label = encode_label("José Müller");
        assert!(!label.degraded);
        assert_eq!(label.text, "José Müller");
        assert_eq!(label.bytes, b"Jos\xe9 M\xfcller");
    }

    #[test]
    fn test_win_ansi_extras() {
        assert_eq!(encode_win_ansi("€5 – “ok”").unwrap(), b"\x805 \x96 \x93ok\x94");
    }

    #[test]
    fn test_vietnamese_name_falls_back_to_ascii() {
        let label = encode_label("Nguyễn Văn A");
        assert!(label.degraded);
        assert_eq!(label.text, "Nguyn Vn A");
        assert_eq!(label.bytes, b"Nguyn Vn A");
    }

    #[test]
    fn test_fallback_drops_all_non_ascii() {
        // 'ê' is encodable on its own, but once the exact attempt fails the
        // whole name drops to ASCII
        assert_eq!(encode_label("Lê Văn C").text, "L Vn C");
    }

    #[test]
    fn test_control_characters_are_unencodable() {
        assert_eq!(
            encode_win_ansi("a\tb"),
            Err(UnencodableChar { ch: '\t' })
        );
        assert_eq!(encode_label("Tab\tName").text, "TabName");
    }

    #[test]
    fn test_empty_name() {
        let label = encode_label("");
        assert!(!label.degraded);
        assert!(label.bytes.is_empty());
    }
}
