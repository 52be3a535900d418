//! MIME transfer-encoding and header-encoding codecs.
//!
//! Covers Base64 and charset-aware Quoted-Printable (RFC 2045), and
//! RFC 2047 encoded-words (`=?charset?B|Q?data?=`) used in headers.

use crate::charset;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data into raw bytes. Whitespace (line breaks inserted
/// by the sender's MUA) is stripped first, per RFC 2045 §6.8.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64 once whitespace is
/// removed.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Maximum line length for Quoted-Printable encoding.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes text using Quoted-Printable encoding (RFC 2045).
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::new();
    let mut line_length = 0;

    for byte in text.as_bytes() {
        if line_length >= MAX_LINE_LENGTH - 3 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        match byte {
            b'!'..=b'<' | b'>'..=b'~' => {
                result.push(*byte as char);
                line_length += 1;
            }
            b' ' => {
                if line_length >= MAX_LINE_LENGTH - 1 {
                    result.push_str("=20");
                    line_length += 3;
                } else {
                    result.push(' ');
                    line_length += 1;
                }
            }
            _ => {
                result.push('=');
                let _ = write!(result, "{byte:02X}");
                line_length += 3;
            }
        }
    }

    result
}

/// Removes soft line breaks (`=\r\n` / `=\n`) and decodes `=XX` escapes
/// into raw bytes, without interpreting them under any charset yet.
///
/// This is the byte-level half of RFC 2045 quoted-printable decoding;
/// callers that have a target charset should use
/// [`decode_quoted_printable_charset`] instead so that multi-byte
/// sequences split across `=XX` escapes are interpreted correctly.
fn qp_to_bytes(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'=' if bytes[i..].starts_with(b"=\r\n") => i += 3,
            b'=' if bytes[i..].starts_with(b"=\n") => i += 2,
            b'=' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                let hi = (bytes[i + 1] as char).to_digit(16).unwrap_or(0);
                let lo = (bytes[i + 2] as char).to_digit(16).unwrap_or(0);
                out.push(((hi << 4) | lo) as u8);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    out
}

/// Returns true if `text` looks like it already contains well-formed
/// Unicode and none of the classic QP trigger sequences — in which case
/// a decoder that ran twice (or ran against content that was never
/// actually encoded) should leave it alone rather than mangle it.
///
/// Per the design notes: generalised to *any* high-bit byte expressed
/// in `=XX` hex form, not just the German-umlaut subset the original
/// heuristic special-cased.
#[must_use]
fn looks_already_decoded(text: &str) -> bool {
    let has_hex_escape = {
        let bytes = text.as_bytes();
        (0..bytes.len().saturating_sub(2)).any(|i| {
            bytes[i] == b'='
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit()
                && u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""),
                    16,
                )
                .is_ok_and(|b| b >= 0x80 || b == 0x3D)
        })
    };
    let has_soft_break = text.contains("=\r\n") || text.contains("=\n");

    charset::is_decode_fixed_point(text) && !has_hex_escape && !has_soft_break
}

/// Decodes Quoted-Printable text assuming the result is plain ASCII
/// (no charset interpretation). Kept for callers that only need the
/// legacy byte-for-byte behaviour and round-trip tests.
///
/// # Errors
///
/// Returns an error if the decoded bytes are not valid UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let bytes = qp_to_bytes(text);
    String::from_utf8(bytes).map_err(Into::into)
}

/// Decodes Quoted-Printable text and interprets the resulting bytes
/// under `charset`.
///
/// If `charset` is (or normalises to) `utf-8` but the bytes aren't
/// valid UTF-8, falls back through `windows-1252` then `iso-8859-1` —
/// every byte sequence is valid under the latter, so this never fails.
/// Guards against double-decoding already-clean Unicode text that
/// happens to contain no real QP escapes.
#[must_use]
pub fn decode_quoted_printable_charset(text: &str, charset: &str) -> String {
    decode_quoted_printable_charset_reporting_repair(text, charset).0
}

/// Same as [`decode_quoted_printable_charset`], but also reports whether
/// the mis-encoding repair fired on the decoded bytes.
#[must_use]
pub fn decode_quoted_printable_charset_reporting_repair(text: &str, charset: &str) -> (String, bool) {
    if looks_already_decoded(text) {
        return (text.to_string(), false);
    }

    let bytes = qp_to_bytes(text);
    let canonical = charset::normalize_alias(charset);

    if canonical == "utf-8" {
        if let Ok(s) = String::from_utf8(bytes.clone()) {
            return (s, false);
        }
        for fallback in ["windows-1252", "iso-8859-1"] {
            let (decoded, repaired) = charset::decode_bytes_reporting_repair(&bytes, fallback);
            if !decoded.is_empty() || bytes.is_empty() {
                return (decoded, repaired);
            }
        }
    }

    charset::decode_bytes_reporting_repair(&bytes, &canonical)
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Only encodes when the text contains non-ASCII or characters that
/// would otherwise be ambiguous in a header.
///
/// # Errors
///
/// Returns an error if encoding fails (never in practice for Base64).
pub fn encode_rfc2047(text: &str, charset: &str) -> Result<String> {
    if text.chars().all(|c| c.is_ascii() && c != '=' && c != '?') {
        return Ok(text.to_string());
    }

    let encoded = encode_base64(text.as_bytes());
    Ok(format!("=?{charset}?B?{encoded}?="))
}

/// Decodes a single RFC 2047 encoded-word, or returns the input
/// unchanged if it isn't one.
///
/// # Errors
///
/// Returns an error if the encoded-word is malformed (wrong number of
/// `?`-delimited fields, or an unknown encoding letter).
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let Some(decoded) = decode_one_encoded_word(text) else {
        return Ok(text.to_string());
    };
    Ok(decoded)
}

/// Attempts to decode `text` as a single `=?charset?enc?data?=` word.
fn decode_one_encoded_word(text: &str) -> Option<String> {
    let inner = text.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let cs = parts.next()?;
    let enc = parts.next()?;
    let data = parts.next()?;

    match enc.to_ascii_uppercase().as_str() {
        "B" => {
            let bytes = decode_base64(data).ok()?;
            Some(charset::decode_bytes(&bytes, cs))
        }
        "Q" => {
            let bytes = q_encoding_to_bytes(data);
            Some(charset::decode_bytes(&bytes, cs))
        }
        _ => None,
    }
}

/// Converts Q-encoded text to raw bytes: `_` is a literal space, `=XX`
/// is a raw byte given as hex. Never interprets the hex digits as a
/// Unicode code point directly — the resulting byte string is handed
/// to the declared charset afterwards.
fn q_encoding_to_bytes(data: &str) -> Vec<u8> {
    let bytes = data.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                let hi = (bytes[i + 1] as char).to_digit(16).unwrap_or(0);
                let lo = (bytes[i + 2] as char).to_digit(16).unwrap_or(0);
                out.push(((hi << 4) | lo) as u8);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    out
}

/// Decodes a full header value that may contain zero or more RFC 2047
/// encoded-words interspersed with plain text.
///
/// Adjacent encoded-words separated only by linear whitespace are
/// merged without introducing a space between them (RFC 2047 §6.2),
/// and decoding iterates to a fixed point so nested or chained
/// encoded-words fully resolve.
#[must_use]
pub fn decode_header_words(input: &str) -> String {
    let mut current = input.to_string();

    for _ in 0..8 {
        let next = decode_header_words_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }

    current
}

fn decode_header_words_once(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut last_was_encoded_word = false;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"=?") {
            if let Some((decoded, consumed)) = try_decode_word_at(&input[i..]) {
                out.push_str(&decoded);
                i += consumed;
                last_was_encoded_word = true;
                continue;
            }
        }

        // Whitespace between two encoded-words is swallowed, not emitted,
        // so "=?UTF-8?Q?Hi?= =?UTF-8?Q?There?=" decodes to "HiThere".
        if last_was_encoded_word && bytes[i].is_ascii_whitespace() {
            let ws_start = i;
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if input[j..].starts_with("=?") {
                i = j;
                continue;
            }
            out.push_str(&input[ws_start..j]);
            i = j;
            last_was_encoded_word = false;
            continue;
        }

        last_was_encoded_word = false;
        let ch_len = input[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }

    out
}

/// Tries to decode one `=?charset?enc?data?=` word starting at the
/// beginning of `s`. Returns the decoded text and the number of bytes
/// consumed from `s`, or `None` if `s` doesn't start with a well-formed
/// encoded-word.
fn try_decode_word_at(s: &str) -> Option<(String, usize)> {
    debug_assert!(s.starts_with("=?"));
    let rest = &s[2..];
    let q1 = rest.find('?')?;
    let charset = &rest[..q1];
    let after_cs = &rest[q1 + 1..];
    let q2 = after_cs.find('?')?;
    let enc = &after_cs[..q2];
    if !matches!(enc.len(), 1) || !matches!(enc.to_ascii_uppercase().as_str(), "B" | "Q") {
        return None;
    }
    let after_enc = &after_cs[q2 + 1..];
    let end = after_enc.find("?=")?;
    let data = &after_enc[..end];

    let total_len = 2 + q1 + 1 + q2 + 1 + end + 2;
    let word = &s[..total_len];
    let decoded = decode_one_encoded_word(word)?;
    Some((decoded, total_len))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_quoted_printable_encode() {
        let text = "Hello, World!";
        let encoded = encode_quoted_printable(text);
        assert_eq!(encoded, "Hello, World!");

        let text = "Héllo, Wørld!";
        let encoded = encode_quoted_printable(text);
        assert!(encoded.contains("=C3"));
    }

    #[test]
    fn test_quoted_printable_decode() {
        let encoded = "H=C3=A9llo";
        let decoded = decode_quoted_printable(encoded).unwrap();
        assert_eq!(decoded, "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let encoded = "Hello=\r\nWorld";
        let decoded = decode_quoted_printable(encoded).unwrap();
        assert_eq!(decoded, "HelloWorld");
    }

    #[test]
    fn quoted_printable_iso_8859_1_body() {
        // "This is =E4 test." -> "This is ä test." (S3 from the spec).
        let decoded = decode_quoted_printable_charset("This is =E4 test.", "iso-8859-1");
        assert_eq!(decoded, "This is ä test.");
    }

    #[test]
    fn quoted_printable_html_body() {
        let decoded = decode_quoted_printable_charset("<p>=E4</p>", "iso-8859-1");
        assert_eq!(decoded, "<p>ä</p>");
    }

    #[test]
    fn quoted_printable_does_not_double_decode_clean_unicode() {
        let clean = "Café already decoded";
        assert_eq!(decode_quoted_printable_charset(clean, "utf-8"), clean);
    }

    #[test]
    fn test_rfc2047_encode() {
        let text = "Hello";
        let encoded = encode_rfc2047(text, "utf-8").unwrap();
        assert_eq!(encoded, "Hello");

        let text = "Héllo";
        let encoded = encode_rfc2047(text, "utf-8").unwrap();
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
    }

    #[test]
    fn test_rfc2047_decode_base64() {
        let encoded = "=?UTF-8?B?Q2Fmw6kgaW4gTcO8bmNoZW4=?=";
        let decoded = decode_rfc2047(encoded).unwrap();
        assert_eq!(decoded, "Café in München");
    }

    #[test]
    fn test_rfc2047_decode_quoted_printable() {
        let encoded = "=?UTF-8?Q?Caf=C3=A9_in_M=C3=BCnchen?=";
        let decoded = decode_rfc2047(encoded).unwrap();
        assert_eq!(decoded, "Café in München");
    }

    #[test]
    fn rfc2047_q_encoding_never_treats_hex_as_codepoints() {
        // =E4 under iso-8859-1 must become 'ä', not U+00E4's raw byte reused blindly.
        let encoded = "=?iso-8859-1?Q?caf=E4?=";
        let decoded = decode_rfc2047(encoded).unwrap();
        assert_eq!(decoded, "café");
    }

    #[test]
    fn adjacent_encoded_words_merge_without_space() {
        let header = "=?UTF-8?Q?Hi?= =?UTF-8?Q?There?=";
        assert_eq!(decode_header_words(header), "HiThere");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(decode_header_words("Plain Subject"), "Plain Subject");
    }

    #[test]
    fn mixed_plain_and_encoded_words() {
        let header = "Re: =?UTF-8?B?Q2Fmw6k=?= invoice";
        assert_eq!(decode_header_words(header), "Re: Café invoice");
    }
}
