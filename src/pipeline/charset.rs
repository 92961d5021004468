//! Text decoding for converters that read character data.
//!
//! The decoding cascade is:
//!
//! 1. the charset carried by the [`crate::StreamInfo`] (if `encoding_rs`
//!    recognises the label),
//! 2. a byte-order mark,
//! 3. UTF-8 when the bytes are valid UTF-8,
//! 4. windows-1252, which maps every byte and so never fails.
//!
//! HTML converters additionally look for `<meta charset>` declarations via
//! [`extract_charset_from_html`] before falling back to step 2.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Only the head of an HTML document is scanned for meta charset tags.
const META_SCAN_LIMIT: usize = 1024;

static RE_META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9_:.\-]+)"#).unwrap()
});

/// Decode `bytes` to a `String`, returning the encoding actually used.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> (String, &'static Encoding) {
    if let Some(encoding) = charset.and_then(|c| Encoding::for_label(c.trim().as_bytes())) {
        let (text, _) = encoding.decode_with_bom_removal(bytes);
        return (text.into_owned(), encoding);
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), encoding);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), UTF_8),
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            (text.into_owned(), WINDOWS_1252)
        }
    }
}

/// `true` when `bytes` look like text: valid UTF-8 (or BOM-marked) without
/// NUL bytes. `bytes` may be a sample, so a multi-byte sequence cut off at
/// the very end is tolerated.
pub fn looks_like_text(bytes: &[u8]) -> bool {
    if Encoding::for_bom(bytes).is_some() {
        return true;
    }
    if bytes.contains(&0) {
        return false;
    }
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Charset declared by a `<meta charset>` or `<meta http-equiv>` tag within
/// the first kilobyte of an HTML document.
pub fn extract_charset_from_html(html: &[u8]) -> Option<String> {
    let head = &html[..html.len().min(META_SCAN_LIMIT)];
    RE_META_CHARSET
        .captures(head)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_charset_wins() {
        let (text, enc) = decode_text(&[0x63, 0x61, 0x66, 0xE9], Some("latin1"));
        assert_eq!(text, "café");
        assert_eq!(enc, WINDOWS_1252); // WHATWG maps latin1 to windows-1252
    }

    #[test]
    fn unknown_label_falls_through() {
        let (text, enc) = decode_text("naïve".as_bytes(), Some("not-a-charset"));
        assert_eq!(text, "naïve");
        assert_eq!(enc, UTF_8);
    }

    #[test]
    fn bom_is_detected_and_stripped() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hi".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, enc) = decode_text(&bytes, None);
        assert_eq!(text, "hi");
        assert_eq!(enc.name(), "UTF-16LE");
    }

    #[test]
    fn invalid_utf8_falls_back_to_windows_1252() {
        let (text, enc) = decode_text(&[0x93, 0x71, 0x94], None);
        assert_eq!(text, "\u{201C}q\u{201D}");
        assert_eq!(enc, WINDOWS_1252);
    }

    #[test]
    fn text_detection() {
        assert!(looks_like_text(b"plain ascii\n"));
        assert!(looks_like_text("ünïcödé".as_bytes()));
        assert!(!looks_like_text(b"\x00\x01binary"));
        assert!(!looks_like_text(&[0xC3, 0x28]));
        // "é" split by a sample boundary
        assert!(looks_like_text(&[b'a', 0xC3]));
    }

    #[test]
    fn meta_charset_html5() {
        let html = b"<html><head><meta charset=\"ISO-8859-1\"></head></html>";
        assert_eq!(extract_charset_from_html(html).as_deref(), Some("ISO-8859-1"));
    }

    #[test]
    fn meta_charset_http_equiv() {
        let html =
            b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1251\">";
        assert_eq!(
            extract_charset_from_html(html).as_deref(),
            Some("windows-1251")
        );
    }

    #[test]
    fn meta_charset_absent() {
        assert_eq!(extract_charset_from_html(b"<html><body>x</body></html>"), None);
    }
}
