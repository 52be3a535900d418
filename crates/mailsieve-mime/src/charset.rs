//! Charset alias normalisation, detection, and byte decoding.
//!
//! Mail servers label text with a wide variety of charset names, several
//! of which are outright wrong for the bytes that follow. This module
//! folds the common aliases into a small canonical set, falls back to
//! BOM sniffing and statistical detection when no charset is declared,
//! and repairs the classic "double UTF-8" mis-encoding that shows up
//! when a sender's MUA mislabels UTF-8 text as Latin-1.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

/// Canonical charset names this decoder distinguishes between.
///
/// Anything not in this set is still accepted (unknown names pass
/// through to `encoding_rs`'s own alias table for last-chance lookup).
const CANONICAL: &[(&str, &str)] = &[
    ("utf8", "utf-8"),
    ("utf-8", "utf-8"),
    ("unicode-1-1-utf-8", "utf-8"),
    ("iso-8859-1", "iso-8859-1"),
    ("iso8859-1", "iso-8859-1"),
    ("latin1", "iso-8859-1"),
    ("latin-1", "iso-8859-1"),
    ("cp819", "iso-8859-1"),
    ("iso-8859-15", "iso-8859-15"),
    ("iso8859-15", "iso-8859-15"),
    ("latin9", "iso-8859-15"),
    ("windows-1252", "windows-1252"),
    ("cp1252", "windows-1252"),
    ("ansi_x3.4-1968", "us-ascii"),
    ("ascii", "us-ascii"),
    ("us-ascii", "us-ascii"),
    ("macintosh", "mac-roman"),
    ("mac-roman", "mac-roman"),
    ("x-mac-roman", "mac-roman"),
    ("utf-16be", "utf-16be"),
    ("utf-16le", "utf-16le"),
    ("utf-16", "utf-16le"),
    ("utf-32", "utf-32"),
    ("utf-32be", "utf-32"),
    ("utf-32le", "utf-32"),
];

/// Normalises a declared charset name into this crate's canonical form.
///
/// Unknown names are lower-cased and passed through unchanged so the
/// caller can still attempt a last-chance lookup via `encoding_rs`.
#[must_use]
pub fn normalize_alias(name: &str) -> String {
    let lower = name.trim().trim_matches('"').to_lowercase();
    for (alias, canonical) in CANONICAL {
        if lower == *alias {
            return (*canonical).to_string();
        }
    }
    lower
}

/// Charset detected from a byte-order mark, if any.
#[must_use]
pub fn detect_bom(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        Some("utf-32")
    } else if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some("utf-8")
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some("utf-16be")
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some("utf-16le")
    } else {
        None
    }
}

/// Bytes that only occur in Windows-1252, never in valid ISO-8859-1 text
/// (the C1 control range Windows-1252 repurposes for printable characters).
fn is_windows_1252_only(byte: u8) -> bool {
    matches!(
        byte,
        0x80 | 0x82..=0x8C | 0x8E | 0x91..=0x9C | 0x9E | 0x9F
    )
}

/// Guesses a charset for undeclared, BOM-less text.
///
/// Order of preference: valid multi-byte UTF-8, then Windows-1252 (if a
/// byte appears that's only meaningful there), else ISO-8859-1 as the
/// universal fallback (every byte sequence is valid Latin-1).
#[must_use]
pub fn detect_statistical(bytes: &[u8]) -> &'static str {
    if std::str::from_utf8(bytes).is_ok() && bytes.iter().any(|&b| b >= 0x80) {
        return "utf-8";
    }
    if bytes.iter().any(|&b| is_windows_1252_only(b)) {
        return "windows-1252";
    }
    "iso-8859-1"
}

/// Resolves the `encoding_rs` codec for a canonicalised charset name.
fn lookup(name: &str) -> &'static Encoding {
    Encoding::for_label(name.as_bytes()).unwrap_or(UTF_8)
}

/// Decodes raw bytes under the given declared (or detected) charset.
///
/// Applies BOM detection first (a BOM always wins over a declared
/// charset, matching what real MUAs do), normalises aliases, and falls
/// back to statistical detection when `charset` is empty.
#[must_use]
pub fn decode_bytes(bytes: &[u8], charset: &str) -> String {
    decode_bytes_reporting_repair(bytes, charset).0
}

/// Same as [`decode_bytes`], but also reports whether the classic
/// double-encoding repair actually rewrote the text, so callers that
/// need to surface a `DecodeWarning` for it don't have to re-run the
/// marker scan against already-repaired text.
#[must_use]
pub fn decode_bytes_reporting_repair(bytes: &[u8], charset: &str) -> (String, bool) {
    if let Some(bom_charset) = detect_bom(bytes) {
        let enc = lookup(bom_charset);
        let (text, _, _) = enc.decode(bytes);
        return (text.into_owned(), false);
    }

    let canonical = if charset.trim().is_empty() {
        detect_statistical(bytes).to_string()
    } else {
        normalize_alias(charset)
    };

    let enc = lookup(&canonical);
    let (text, _, had_errors) = enc.decode(bytes);
    let text = text.into_owned();

    if had_errors || matches!(canonical.as_str(), "iso-8859-1" | "windows-1252") {
        match repair_double_encoding(&text) {
            Some(repaired) => (repaired, true),
            None => (text, false),
        }
    } else {
        (text, false)
    }
}

/// Classic mis-encoding fingerprints: a UTF-8 byte sequence that was
/// re-decoded as Latin-1/Windows-1252, producing these two-character
/// artefacts in place of a single accented letter.
const DOUBLE_ENCODING_MARKERS: &[&str] = &[
    "Ã¼", "Ã¤", "Ã¶", "ÃŸ", "Ã©", "Ã¨", "Ã ", "Ã¢", "Ã§", "Ã\u{AD}", "Ã±", "Ã³", "Ãº", "Â ", "Â©",
    "â€™", "â€œ", "â€\u{9D}", "â€“", "â€”",
];

/// Attempts to repair text that was UTF-8 but got decoded one layer too
/// shallow (declared iso-8859-1/windows-1252, actually UTF-8 bytes).
///
/// Re-encodes the (wrongly decoded) text back to Latin-1 bytes — a
/// lossless round trip, since every `char` below U+0100 maps to one
/// Latin-1 byte — and tries UTF-8 decoding that byte sequence. Returns
/// `None` when no repair was warranted or the round trip doesn't
/// produce well-formed UTF-8.
#[must_use]
pub fn repair_double_encoding(text: &str) -> Option<String> {
    if !DOUBLE_ENCODING_MARKERS.iter().any(|m| text.contains(m)) {
        return None;
    }

    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let cp = ch as u32;
        if cp <= 0xFF {
            bytes.push(cp as u8);
        } else {
            // Not representable as Latin-1; the repair doesn't apply.
            return None;
        }
    }

    String::from_utf8(bytes).ok().filter(|s| s != text)
}

/// Fixed-point iteration over the QP-trigger heuristic used by the
/// transfer-encoding decoder: returns true once `text` shows no sign of
/// further double-encoding and contains at least one well-formed
/// multi-byte UTF-8 sequence, i.e. decoding again would be a no-op.
#[must_use]
pub fn is_decode_fixed_point(text: &str) -> bool {
    let has_multibyte = text.chars().any(|c| c as u32 > 0x7F);
    let has_marker = DOUBLE_ENCODING_MARKERS.iter().any(|m| text.contains(m));
    has_multibyte && !has_marker
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_aliases() {
        assert_eq!(normalize_alias("UTF8"), "utf-8");
        assert_eq!(normalize_alias("Latin1"), "iso-8859-1");
        assert_eq!(normalize_alias("CP1252"), "windows-1252");
        assert_eq!(normalize_alias("\"us-ascii\""), "us-ascii");
    }

    #[test]
    fn unknown_alias_passes_through_lowercased() {
        assert_eq!(normalize_alias("KOI8-R"), "koi8-r");
    }

    #[test]
    fn detects_utf8_bom() {
        let bytes = [0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(detect_bom(&bytes), Some("utf-8"));
    }

    #[test]
    fn detects_utf16_boms() {
        assert_eq!(detect_bom(&[0xFE, 0xFF, 0, b'h']), Some("utf-16be"));
        assert_eq!(detect_bom(&[0xFF, 0xFE, b'h', 0]), Some("utf-16le"));
    }

    #[test]
    fn statistical_detection_prefers_utf8() {
        let bytes = "Café".as_bytes();
        assert_eq!(detect_statistical(bytes), "utf-8");
    }

    #[test]
    fn statistical_detection_falls_back_to_windows_1252() {
        // 0x92 is a smart-quote only meaningful in Windows-1252.
        let bytes = [b'h', b'i', 0x92];
        assert_eq!(detect_statistical(&bytes), "windows-1252");
    }

    #[test]
    fn statistical_detection_falls_back_to_latin1() {
        let bytes = [b'h', b'i', 0xE4];
        assert_eq!(detect_statistical(&bytes), "iso-8859-1");
    }

    #[test]
    fn decodes_declared_iso_8859_1() {
        let bytes = [b'h', 0xE4]; // "hä" in Latin-1
        assert_eq!(decode_bytes(&bytes, "iso-8859-1"), "hä");
    }

    #[test]
    fn reports_no_repair_for_clean_latin1() {
        let bytes = [b'h', 0xE4];
        let (text, repaired) = decode_bytes_reporting_repair(&bytes, "iso-8859-1");
        assert_eq!(text, "hä");
        assert!(!repaired);
    }

    #[test]
    fn reports_repair_for_double_encoded_utf8() {
        let utf8_bytes = "für".as_bytes();
        let mis_decoded_bytes: Vec<u8> = utf8_bytes.to_vec();
        let (text, repaired) = decode_bytes_reporting_repair(&mis_decoded_bytes, "iso-8859-1");
        assert_eq!(text, "für");
        assert!(repaired);
    }

    #[test]
    fn repairs_double_encoded_umlauts() {
        // "für" encoded as UTF-8, then mis-decoded as Latin-1.
        let utf8_bytes = "für".as_bytes();
        let mis_decoded: String = utf8_bytes.iter().map(|&b| b as char).collect();
        assert!(mis_decoded.contains("Ã¼"));
        let repaired = repair_double_encoding(&mis_decoded).unwrap();
        assert_eq!(repaired, "für");
    }

    #[test]
    fn fixed_point_detects_clean_unicode() {
        assert!(is_decode_fixed_point("Café"));
        assert!(!is_decode_fixed_point("plain ascii"));
    }
}
