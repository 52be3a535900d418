//! HTML sanitiser and plain-text normaliser (spec.md §4.7 "The renderer
//! transforms HTML for safe display").
//!
//! Operates on an already-selected body (§4.6 output); never re-parses
//! MIME structure. Every step is independent and order-sensitive the way
//! the spec lists them: preamble stripping before entity decoding, entity
//! decoding before `cid:` rewriting, sanitisation before the minimal-document
//! wrap.

use std::fmt::Write as _;

use std::sync::LazyLock as Lazy;

use regex::{Regex, RegexBuilder};

use crate::render::parts::InlineReference;
use crate::render::{RenderOptions, Warning};

static STRAY_HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(content-type|content-transfer-encoding|mime-version|content-disposition)\s*:")
        .expect("static regex")
});
static BOUNDARY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--\S+--?\s*$").expect("static regex"));

static DOCTYPE: Lazy<Regex> =
    Lazy::new(|| RegexBuilder::new(r"<!DOCTYPE[^>]*>").case_insensitive(true).dot_matches_new_line(true).build().expect("static regex"));
static ORPHAN_DTD_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*"-//[^\n]*">?\s*$"#).expect("static regex"));

static META_CONTENT_TYPE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"<meta[^>]*http-equiv=["']?content-type["']?[^>]*>"#)
        .case_insensitive(true)
        .build()
        .expect("static regex")
});
static ORPHAN_CHARSET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^\s*charset\s*=\s*\S*\s*$").expect("static regex"));

static TAG_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static NAMED_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&([a-zA-Z][a-zA-Z0-9]*);").expect("static regex"));
static DECIMAL_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#([0-9]+);").expect("static regex"));
static HEX_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)&#x([0-9a-f]+);").expect("static regex"));

static WINGDINGS_SPAN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"<span[^>]*font-family:\s*wingdings[^>]*>\s*([JKL])\s*</span>"#)
        .case_insensitive(true)
        .build()
        .expect("static regex")
});

static CID_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"cid:([^"'\s>]+)"#).expect("static regex"));

static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| RegexBuilder::new(r"<script\b[^>]*>.*?</script\s*>").case_insensitive(true).dot_matches_new_line(true).build().expect("static regex"));
static EVENT_HANDLER_ATTR: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"\s+on[a-z]+\s*=\s*("([^"]*)"|'([^']*)'|[^\s>]+)"#)
        .case_insensitive(true)
        .build()
        .expect("static regex")
});
static JS_URL_ATTR: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"(href|src)\s*=\s*("javascript:[^"]*"|'javascript:[^']*')"#)
        .case_insensitive(true)
        .build()
        .expect("static regex")
});
static IMG_SRC: Lazy<Regex> = Lazy::new(|| RegexBuilder::new(r#"(<img\b[^>]*\bsrc\s*=\s*)("https?://[^"]*"|'https?://[^']*')"#).case_insensitive(true).build().expect("static regex"));
static ANCHOR_HREF: Lazy<Regex> = Lazy::new(|| RegexBuilder::new(r#"(<a\b[^>]*\bhref\s*=\s*)("https?://[^"]*"|'https?://[^']*')"#).case_insensitive(true).build().expect("static regex"));
static HAS_HTML_OR_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(html|body)[\s>]").expect("static regex"));
static IMG_TAG: Lazy<Regex> = Lazy::new(|| RegexBuilder::new(r"<img\b([^>]*)>").case_insensitive(true).build().expect("static regex"));

const DEFAULT_CONTENT: &str = "(no readable content)";

/// Transforms a selected HTML body into safe-to-display markup per the
/// eight steps of spec.md §4.7, rewriting `cid:` references against
/// `inline_references` and the given `message_id`.
#[must_use]
pub fn render_html(raw: &str, options: &RenderOptions, inline_references: &[InlineReference], message_id: &str) -> (String, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut html = strip_stray_preamble(raw);
    html = DOCTYPE.replace_all(&html, "").into_owned();
    html = ORPHAN_DTD_LINE.replace_all(&html, "").into_owned();
    html = META_CONTENT_TYPE.replace_all(&html, "").into_owned();
    html = ORPHAN_CHARSET_LINE.replace_all(&html, "").into_owned();
    html = decode_entities_outside_tags(&html);
    html = convert_wingdings(&html);
    html = rewrite_cid_references(&html, inline_references, message_id, &mut warnings);

    if options.sanitize_html {
        html = sanitize(&html, options, &mut warnings);
    }

    if options.max_image_width > 0 {
        html = clamp_image_width(&html, options.max_image_width);
    }

    if !HAS_HTML_OR_BODY.is_match(&html) {
        html = wrap_minimal_document(&html);
    }

    (html, warnings)
}

/// Strips a leading block of stray MIME headers / boundary lines, up to
/// and including the first blank line, when the body starts with one.
fn strip_stray_preamble(raw: &str) -> String {
    let mut lines = raw.lines().peekable();
    let Some(&first) = lines.peek() else { return raw.to_string() };
    if !STRAY_HEADER_LINE.is_match(first) && !BOUNDARY_LINE.is_match(first) {
        return raw.to_string();
    }

    let mut consumed = 0usize;
    let mut saw_blank = false;
    for line in raw.lines() {
        consumed += 1;
        if line.trim().is_empty() {
            saw_blank = true;
            break;
        }
        if !STRAY_HEADER_LINE.is_match(line) && !BOUNDARY_LINE.is_match(line) {
            // Not a clean header block after all; leave the body untouched.
            return raw.to_string();
        }
    }
    if !saw_blank {
        return raw.to_string();
    }
    raw.lines().skip(consumed).collect::<Vec<_>>().join("\n")
}

/// Decodes named/decimal/hex HTML entities in text outside `<...>` tags,
/// leaving tag contents (attribute values, structural entities) untouched.
fn decode_entities_outside_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in TAG_SPLIT.find_iter(html) {
        out.push_str(&decode_entities(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&decode_entities(&html[last..]));
    out
}

fn decode_entities(text: &str) -> String {
    let text = NAMED_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| named_entity(&caps[1]).map_or_else(|| caps[0].to_string(), ToString::to_string));
    let text = DECIMAL_ENTITY.replace_all(&text, |caps: &regex::Captures<'_>| {
        caps[1].parse::<u32>().ok().and_then(char::from_u32).map_or_else(|| caps[0].to_string(), |c| c.to_string())
    });
    HEX_ENTITY
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16).ok().and_then(char::from_u32).map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    // Structural entities are preserved verbatim outside tags too (they're
    // meaningful literal characters, not presentation); only the common
    // prose entities are expanded.
    Some(match name {
        "nbsp" => '\u{a0}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => return None,
    })
}

fn convert_wingdings(html: &str) -> String {
    WINGDINGS_SPAN
        .replace_all(html, |caps: &regex::Captures<'_>| {
            match caps[1].to_ascii_uppercase().as_str() {
                "J" => "😊",
                "L" => "😞",
                "K" => "😐",
                _ => unreachable!("character class restricts to J/K/L"),
            }
        })
        .into_owned()
}

fn rewrite_cid_references(html: &str, inline_references: &[InlineReference], message_id: &str, warnings: &mut Vec<Warning>) -> String {
    CID_REF
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let cid = &caps[1];
            if inline_references.iter().any(|r| r.content_id == cid) {
                format!("/mail/{message_id}/cid/{cid}")
            } else {
                warnings.push(Warning::CidNotFound(cid.to_string()));
                "#cid-not-found".to_string()
            }
        })
        .into_owned()
}

fn sanitize(html: &str, options: &RenderOptions, warnings: &mut Vec<Warning>) -> String {
    let mut out = html.to_string();

    if SCRIPT_TAG.is_match(&out) {
        out = SCRIPT_TAG.replace_all(&out, "").into_owned();
        warnings.push(Warning::RemovedScript);
    }

    out = EVENT_HANDLER_ATTR.replace_all(&out, "").into_owned();
    out = JS_URL_ATTR.replace_all(&out, r##"$1="#blocked""##).into_owned();

    if options.effective_block_remote() {
        out = IMG_SRC
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                warnings.push(Warning::BlockedRemoteContent);
                format!("{}\"#blocked\"", &caps[1])
            })
            .into_owned();
        out = ANCHOR_HREF
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                warnings.push(Warning::BlockedRemoteContent);
                format!("{}\"#blocked\"", &caps[1])
            })
            .into_owned();
    }

    out
}

fn clamp_image_width(html: &str, max_width: u32) -> String {
    IMG_TAG
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let attrs = &caps[1];
            if attrs.to_ascii_lowercase().contains("style=") {
                caps[0].to_string()
            } else {
                format!(r#"<img{attrs} style="max-width:{max_width}px">"#)
            }
        })
        .into_owned()
}

fn wrap_minimal_document(body: &str) -> String {
    let mut doc = String::with_capacity(body.len() + 256);
    doc.push_str(
        "<html><head><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <style>body{font-family:-apple-system,Segoe UI,Helvetica,Arial,sans-serif;font-size:14px;}</style>\
         </head><body>",
    );
    doc.push_str(body);
    doc.push_str("</body></html>");
    doc
}

/// Normalises a selected plain-text body: CRLF→LF, collapses runs of ≥3
/// blank lines to 2, trims trailing per-line whitespace, drops trailing
/// orphan single-character delimiter lines, and substitutes a placeholder
/// when nothing is left.
#[must_use]
pub fn render_plain(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<&str> = normalized.lines().map(str::trim_end).collect();

    while matches!(lines.last(), Some(line) if is_orphan_delimiter(line)) {
        lines.pop();
    }

    let mut out = String::with_capacity(normalized.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        let _ = writeln!(out, "{line}");
    }

    let trimmed = out.trim_end_matches('\n').to_string();
    if trimmed.is_empty() { DEFAULT_CONTENT.to_string() } else { trimmed }
}

fn is_orphan_delimiter(line: &str) -> bool {
    matches!(line.trim(), ")" | "]" | "}" | ">" | "-" | "_" | "=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_script_and_event_handlers_and_javascript_urls() {
        let input = r#"<p onclick="x()">hi <script>bad()</script><a href="javascript:foo()">x</a></p>"#;
        let options = RenderOptions::default();
        let (out, warnings) = render_html(input, &options, &[], "M1");
        assert!(!out.contains("<script"));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("javascript:"));
        assert!(out.contains(r#"href="#blocked""#));
        assert!(warnings.contains(&Warning::RemovedScript));
    }

    #[test]
    fn rewrites_known_cid_and_warns_on_unknown() {
        let refs = vec![InlineReference { content_id: "img001@x".to_string(), section_id: "2".to_string() }];
        let input = r#"<img src="cid:img001@x"><img src="cid:missing@y">"#;
        let options = RenderOptions { sanitize_html: false, block_remote: false, ..RenderOptions::default() };
        let (out, warnings) = render_html(input, &options, &refs, "M1");
        assert!(out.contains("src=\"/mail/M1/cid/img001@x\""));
        assert!(warnings.iter().any(|w| matches!(w, Warning::CidNotFound(c) if c == "missing@y")));
    }

    #[test]
    fn per_message_override_loads_remote_content_despite_account_default() {
        let input = r#"<p><img src="https://evil.example/track.gif"><a href="https://example.com">link</a></p>"#;
        let options = RenderOptions { block_remote: true, sanitize_html: true, load_remote_override: Some(true), ..RenderOptions::default() };
        let (out, warnings) = render_html(input, &options, &[], "M1");
        assert!(out.contains(r#"src="https://evil.example/track.gif""#));
        assert!(out.contains(r#"href="https://example.com""#));
        assert!(!warnings.contains(&Warning::BlockedRemoteContent));
    }

    #[test]
    fn per_message_override_blocks_remote_content_despite_account_default() {
        let input = r#"<img src="https://evil.example/track.gif">"#;
        let options = RenderOptions { block_remote: false, sanitize_html: true, load_remote_override: Some(false), ..RenderOptions::default() };
        let (out, _) = render_html(input, &options, &[], "M1");
        assert!(out.contains(r#"src="#blocked""#));
    }

    #[test]
    fn blocks_remote_images_and_anchors_when_enabled() {
        let input = r#"<p><img src="https://evil.example/track.gif"><a href="https://example.com">link</a></p>"#;
        let options = RenderOptions { block_remote: true, sanitize_html: true, ..RenderOptions::default() };
        let (out, warnings) = render_html(input, &options, &[], "M1");
        assert!(out.contains(r#"src="#blocked""#));
        assert!(out.contains(r#"href="#blocked""#));
        assert!(warnings.iter().filter(|w| **w == Warning::BlockedRemoteContent).count() == 2);
    }

    #[test]
    fn wraps_fragment_lacking_html_or_body_tags() {
        let input = "<p>hello</p>";
        let options = RenderOptions::default();
        let (out, _) = render_html(input, &options, &[], "M1");
        assert!(out.contains("<html>"));
        assert!(out.contains("<body>"));
        assert!(out.contains("<p>hello</p>"));
    }

    #[test]
    fn leaves_already_wrapped_documents_alone() {
        let input = "<html><body><p>hi</p></body></html>";
        let options = RenderOptions::default();
        let (out, _) = render_html(input, &options, &[], "M1");
        assert_eq!(out.matches("<html>").count(), 1);
    }

    #[test]
    fn strips_stray_mime_preamble_lines() {
        let input = "Content-Type: text/html; charset=utf-8\r\nContent-Transfer-Encoding: 7bit\r\n\r\n<p>body</p>";
        let options = RenderOptions::default();
        let (out, _) = render_html(input, &options, &[], "M1");
        assert!(!out.contains("Content-Type"));
        assert!(out.contains("<p>body</p>"));
    }

    #[test]
    fn decodes_entities_outside_tags_but_not_inside() {
        let input = r#"<a href="x&amp;y">caf&eacute;</a>"#;
        // &eacute; is not in our small table, so it passes through unchanged;
        // &amp; inside the attribute value must not be touched.
        let options = RenderOptions { sanitize_html: false, block_remote: false, ..RenderOptions::default() };
        let (out, _) = render_html(input, &options, &[], "M1");
        assert!(out.contains(r#"href="x&amp;y""#));
    }

    #[test]
    fn converts_wingdings_letter_spans() {
        let input = r#"<span style="font-family: Wingdings">J</span>"#;
        let options = RenderOptions { sanitize_html: false, block_remote: false, ..RenderOptions::default() };
        let (out, _) = render_html(input, &options, &[], "M1");
        assert!(out.contains('😊'));
    }

    #[test]
    fn plain_text_collapses_blank_runs_and_trims_trailing_whitespace() {
        let input = "line one   \r\nline two\n\n\n\n\nline three";
        let out = render_plain(input);
        assert!(!out.contains("   \n"));
        assert!(!out.contains("\n\n\n\n"));
        assert!(out.ends_with("line three"));
    }

    #[test]
    fn plain_text_drops_trailing_orphan_delimiter_lines() {
        let input = "Dear Sir,\nbody text\n)\n]\n";
        let out = render_plain(input);
        assert_eq!(out, "Dear Sir,\nbody text");
    }

    #[test]
    fn plain_text_empty_result_uses_placeholder() {
        assert_eq!(render_plain(""), DEFAULT_CONTENT);
        assert_eq!(render_plain("\n\n\n"), DEFAULT_CONTENT);
    }
}
