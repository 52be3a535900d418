//! MIME parser: walks a `BODYSTRUCTURE` tree plus its fetched section
//! bytes into decoded parts, a merged body, inline references and
//! attachments.
//!
//! The IMAP layer hands us a structural tree (`mailsieve_imap::parser::BodyStructure`)
//! whose media types are upper-cased and whose parameter/disposition lists
//! are unresolved RFC 2231 fragments — it stops at tokenising the wire
//! grammar. Everything below (lower-casing, continuation decoding, transfer
//! decoding, charset interpretation, multipart merge policy) happens here.

use std::collections::HashMap;

use mailsieve_imap::parser::{BodyStructure, Disposition};
use mailsieve_mime::charset;
use mailsieve_mime::encoding::{decode_base64, decode_header_words, decode_quoted_printable_charset_reporting_repair};

use crate::render::Warning;

/// A decoded leaf of the section tree (spec.md §3 "MIME part record").
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Section id, e.g. `"1"`, `"1.2.3"`.
    pub section_id: String,
    /// Parent section id, `None` at the root.
    pub parent_section_id: Option<String>,
    /// Lower-cased `type/subtype`.
    pub media_type: String,
    /// Lower-cased parameter map (RFC 2231 continuations already folded).
    pub params: HashMap<String, String>,
    /// Charset used to decode this part's text, if textual.
    pub charset: Option<String>,
    /// Declared Content-Transfer-Encoding, lower-cased.
    pub transfer_encoding: String,
    /// Content-Disposition kind (`"inline"`, `"attachment"`), if declared.
    pub disposition: Option<String>,
    /// RFC 2231/2047-decoded filename, if any.
    pub filename: Option<String>,
    /// Content-ID with angle brackets stripped.
    pub content_id: Option<String>,
    /// Declared size in octets, from `BODYSTRUCTURE`.
    pub declared_size: u32,
    /// Decoded bytes (post transfer-encoding).
    pub bytes: Vec<u8>,
    /// Decoded text, if this part is textual.
    pub text: Option<String>,
}

/// A sibling part referenced by a `cid:` URL (spec.md §4.6 step 6).
#[derive(Debug, Clone)]
pub struct InlineReference {
    /// Content-ID, angle brackets stripped.
    pub content_id: String,
    /// Section id of the part the id resolves to.
    pub section_id: String,
}

/// A part classified as an attachment (spec.md §4.6 step 7).
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Section id this attachment was sourced from.
    pub section_id: String,
    /// Best-effort filename, RFC 2231/2047-decoded.
    pub filename: String,
    /// Lower-cased `type/subtype`.
    pub media_type: String,
    /// Content-ID with angle brackets stripped, if present.
    pub content_id: Option<String>,
    /// Whether this attachment is referenced by a `cid:` URL or declared
    /// `disposition: inline`.
    pub is_inline: bool,
    /// Decoded bytes.
    pub bytes: Vec<u8>,
}

/// The body merged up from a subtree by multipart semantics (spec.md
/// §4.6 "Multipart semantics").
#[derive(Debug, Clone, Default)]
pub struct ParsedBody {
    /// Merged plain-text representation, if any part contributed one.
    pub text: Option<String>,
    /// Merged HTML representation, if any part contributed one.
    pub html: Option<String>,
}

/// Everything the orchestrator needs out of one MIME parse pass.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Every leaf encountered, in document order.
    pub parts: Vec<MimePart>,
    /// The body merged up to the root.
    pub body: ParsedBody,
    /// Non-body-candidate parts.
    pub attachments: Vec<Attachment>,
    /// `cid:` resolution table.
    pub inline_references: Vec<InlineReference>,
    /// Accumulated non-fatal warnings.
    pub warnings: Vec<Warning>,
}

struct Ctx<'a> {
    sections: &'a HashMap<String, Vec<u8>>,
    default_charset: &'a str,
    parts: Vec<MimePart>,
    attachments: Vec<Attachment>,
    inline_references: Vec<InlineReference>,
    warnings: Vec<Warning>,
}

/// Parses a `BODYSTRUCTURE` tree against its fetched section bytes.
///
/// `sections` maps section id (as derived by this same numbering scheme)
/// to the raw octets returned by `UID FETCH ... BODY.PEEK[<section>]`.
#[must_use]
pub fn parse(structure: &BodyStructure, sections: &HashMap<String, Vec<u8>>, default_charset: &str) -> ParseResult {
    let mut ctx = Ctx {
        sections,
        default_charset,
        parts: Vec::new(),
        attachments: Vec::new(),
        inline_references: Vec::new(),
        warnings: Vec::new(),
    };

    let body = walk(structure, String::new(), None, false, &mut ctx);

    ParseResult {
        parts: ctx.parts,
        body,
        attachments: ctx.attachments,
        inline_references: ctx.inline_references,
        warnings: ctx.warnings,
    }
}

/// Parses a raw RFC 822 byte stream when no `BODYSTRUCTURE` is available at
/// all (spec.md §4.6 "Boundary recovery" — e.g. an `APPEND` draft, or a
/// server that fails `FETCH BODYSTRUCTURE` but still returns the full
/// body). Splits headers from body; if the declared `Content-Type` is
/// `multipart/*`, recovers its boundary (declared or sniffed, via
/// [`mailsieve_mime::recover_boundary`]) and treats each delimited segment
/// as its own leaf, one level deep. A non-multipart message, or one whose
/// boundary couldn't be recovered, becomes a single `text/*` leaf at
/// section id `"1"`.
#[must_use]
pub fn parse_raw_fallback(raw: &[u8], default_charset: &str) -> ParseResult {
    let raw_str = String::from_utf8_lossy(raw).into_owned();
    let (headers, body) = split_headers_body(&raw_str);

    let content_type = find_content_type(headers).unwrap_or_else(mailsieve_mime::ContentType::text_plain);
    if !content_type.is_multipart() {
        return single_text_leaf(body, default_charset, Vec::new());
    }

    match mailsieve_mime::recover_boundary(headers, body) {
        Some(boundary) => parse_raw_multipart(body, &boundary, default_charset),
        None => single_text_leaf(body, default_charset, vec![Warning::ParseFallback("no boundary recoverable for multipart message".to_string())]),
    }
}

fn parse_raw_multipart(body: &str, boundary: &str, default_charset: &str) -> ParseResult {
    let segments = mailsieve_mime::split_on_boundary(body, boundary);
    let mut parts = Vec::new();
    let mut attachments = Vec::new();
    let mut merged = ParsedBody::default();
    let mut warnings = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let section_id = (i + 1).to_string();
        let (seg_headers, seg_body) = split_headers_body(segment);
        let seg_ct = find_content_type(seg_headers).unwrap_or_else(mailsieve_mime::ContentType::text_plain);
        let media_type = format!("{}/{}", seg_ct.main_type, seg_ct.sub_type);
        let is_textual = media_type.starts_with("text/");
        let encoding = mailsieve_mime::header_value(seg_headers, "content-transfer-encoding").unwrap_or_else(|| "7bit".to_string()).to_lowercase();
        let charset = seg_ct.charset().map(ToString::to_string);
        let part_charset = charset.clone().unwrap_or_else(|| default_charset.to_string());

        let (bytes, text, part_warnings) = decode_transfer_encoding(seg_body.as_bytes(), &encoding, &part_charset, is_textual, &section_id);
        warnings.extend(part_warnings);

        parts.push(MimePart {
            section_id: section_id.clone(),
            parent_section_id: None,
            media_type: media_type.clone(),
            params: seg_ct.parameters.clone(),
            charset,
            transfer_encoding: encoding,
            disposition: None,
            filename: None,
            content_id: None,
            declared_size: seg_body.len() as u32,
            bytes: bytes.clone(),
            text: text.clone(),
        });

        if is_textual {
            let piece = classify_body_text(&media_type, text.unwrap_or_default());
            if merged.text.is_none() {
                merged.text = piece.text;
            }
            if merged.html.is_none() {
                merged.html = piece.html;
            }
        } else {
            attachments.push(Attachment {
                section_id: section_id.clone(),
                filename: default_attachment_name(&section_id, &media_type),
                media_type,
                content_id: None,
                is_inline: false,
                bytes,
            });
        }
    }

    ParseResult { parts, body: merged, attachments, inline_references: Vec::new(), warnings }
}

fn single_text_leaf(body: &str, default_charset: &str, mut warnings: Vec<Warning>) -> ParseResult {
    let (bytes, text, part_warnings) = decode_transfer_encoding(body.as_bytes(), "7bit", default_charset, true, "1");
    warnings.extend(part_warnings);

    let part = MimePart {
        section_id: "1".to_string(),
        parent_section_id: None,
        media_type: "text/plain".to_string(),
        params: HashMap::new(),
        charset: Some(default_charset.to_string()),
        transfer_encoding: "7bit".to_string(),
        disposition: None,
        filename: None,
        content_id: None,
        declared_size: body.len() as u32,
        bytes,
        text: text.clone(),
    };

    ParseResult {
        parts: vec![part],
        body: ParsedBody { text, html: None },
        attachments: Vec::new(),
        inline_references: Vec::new(),
        warnings,
    }
}

fn split_headers_body(raw: &str) -> (&str, &str) {
    if let Some(idx) = raw.find("\r\n\r\n") {
        (&raw[..idx], &raw[idx + 4..])
    } else if let Some(idx) = raw.find("\n\n") {
        (&raw[..idx], &raw[idx + 2..])
    } else {
        (raw, "")
    }
}

fn find_content_type(headers: &str) -> Option<mailsieve_mime::ContentType> {
    let line = mailsieve_mime::header_value(headers, "content-type")?;
    mailsieve_mime::ContentType::parse(&line).ok()
}

/// Converts an already-tokenised `(key, value)` parameter list (as the
/// IMAP parser hands them back) into a decoded, lower-keyed map by
/// synthesising `"key=value"` strings and reusing the RFC 2231
/// continuation resolver that `mailsieve-mime` already applies to
/// `Content-Type` header parameters.
fn decode_param_pairs(pairs: &[(String, String)]) -> HashMap<String, String> {
    let synthesized: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
    mailsieve_mime::parse_parameters(synthesized.iter().map(String::as_str))
}

/// Determines which section ids the orchestrator must fetch *before*
/// calling [`parse`]: every body-candidate leaf (`text/*`, not
/// `attachment`-disposed) and every leaf carrying an inline `Content-ID`
/// (spec.md §4.8 step 3, §5 "the orchestrator fetches inline sections
/// lazily"). Plain attachments are deliberately excluded — they are
/// fetched on demand by `fetch_attachment`, not eagerly parsed.
#[must_use]
pub fn sections_to_fetch(structure: &BodyStructure) -> Vec<String> {
    let mut ids = Vec::new();
    collect_fetch_ids(structure, String::new(), false, &mut ids);
    ids
}

fn collect_fetch_ids(node: &BodyStructure, id: String, force_attachment: bool, out: &mut Vec<String>) {
    match node {
        BodyStructure::Multipart { bodies, subtype, disposition: _ } => {
            let child_force = force_attachment || subtype.eq_ignore_ascii_case("encrypted");
            for (i, child) in bodies.iter().enumerate() {
                let child_id = if id.is_empty() { (i + 1).to_string() } else { format!("{id}.{}", i + 1) };
                collect_fetch_ids(child, child_id, child_force, out);
            }
        }
        BodyStructure::Message { .. } => {}
        BodyStructure::Basic { id: content_id, disposition, .. } => {
            push_if_needed(id, content_id.as_deref(), disposition.as_ref(), false, force_attachment, out);
        }
        BodyStructure::Text { id: content_id, disposition, .. } => {
            push_if_needed(id, content_id.as_deref(), disposition.as_ref(), true, force_attachment, out);
        }
    }
}

fn push_if_needed(
    id: String,
    content_id: Option<&str>,
    disposition: Option<&Disposition>,
    is_textual: bool,
    force_attachment: bool,
    out: &mut Vec<String>,
) {
    let section_id = if id.is_empty() { "1".to_string() } else { id };
    let kind = disposition.map(|d| d.kind.as_str());
    let is_inline = kind == Some("inline") && content_id.is_some_and(|s| !s.is_empty());
    let is_body_candidate = is_textual && !force_attachment && kind != Some("attachment");
    if is_body_candidate || is_inline {
        out.push(section_id);
    }
}

fn walk(node: &BodyStructure, id: String, parent_id: Option<String>, force_attachment: bool, ctx: &mut Ctx<'_>) -> ParsedBody {
    match node {
        BodyStructure::Multipart { bodies, subtype, disposition: _ } => {
            let subtype_lower = subtype.to_lowercase();
            let child_force = force_attachment || subtype_lower == "encrypted";
            let children: Vec<ParsedBody> = bodies
                .iter()
                .enumerate()
                .map(|(i, child)| {
                    let child_id = if id.is_empty() { (i + 1).to_string() } else { format!("{id}.{}", i + 1) };
                    let child_parent = if id.is_empty() { None } else { Some(id.clone()) };
                    walk(child, child_id, child_parent, child_force, ctx)
                })
                .collect();

            merge_multipart(&subtype_lower, children)
        }
        BodyStructure::Basic {
            media_type,
            media_subtype,
            params,
            id: content_id,
            description: _,
            encoding,
            size,
            disposition,
        } => {
            let media_type = format!("{}/{}", media_type.to_lowercase(), media_subtype.to_lowercase());
            leaf(id, parent_id, &media_type, params, content_id.as_deref(), encoding, *size, disposition.as_ref(), force_attachment, ctx)
        }
        BodyStructure::Text {
            subtype,
            params,
            id: content_id,
            description: _,
            encoding,
            size,
            lines: _,
            disposition,
        } => {
            let media_type = format!("text/{}", subtype.to_lowercase());
            leaf(id, parent_id, &media_type, params, content_id.as_deref(), encoding, *size, disposition.as_ref(), force_attachment, ctx)
        }
        BodyStructure::Message { envelope, body: _, lines: _ } => {
            let section_id = if id.is_empty() { "1".to_string() } else { id };
            let filename = envelope.subject.clone().map(|s| format!("{s}.eml")).unwrap_or_else(|| "message.eml".to_string());
            ctx.parts.push(MimePart {
                section_id: section_id.clone(),
                parent_section_id: parent_id,
                media_type: "message/rfc822".to_string(),
                params: HashMap::new(),
                charset: None,
                transfer_encoding: "7bit".to_string(),
                disposition: None,
                filename: Some(filename.clone()),
                content_id: None,
                declared_size: 0,
                bytes: Vec::new(),
                text: None,
            });
            ctx.attachments.push(Attachment {
                section_id,
                filename,
                media_type: "message/rfc822".to_string(),
                content_id: None,
                is_inline: false,
                bytes: Vec::new(),
            });
            ParsedBody::default()
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn leaf(
    id: String,
    parent_id: Option<String>,
    media_type: &str,
    raw_params: &[(String, String)],
    content_id: Option<&str>,
    encoding: &str,
    size: u32,
    disposition: Option<&Disposition>,
    force_attachment: bool,
    ctx: &mut Ctx<'_>,
) -> ParsedBody {
    let section_id = if id.is_empty() { "1".to_string() } else { id };
    let params = decode_param_pairs(raw_params);
    let charset = params.get("charset").map(|c| charset::normalize_alias(c));
    let transfer_encoding = encoding.to_lowercase();
    let disposition_kind = disposition.map(|d| d.kind.clone());
    let content_id = content_id.filter(|s| !s.is_empty()).map(ToString::to_string);

    let filename = disposition
        .map(|d| decode_param_pairs(&d.params))
        .and_then(|p| p.get("filename").cloned())
        .or_else(|| params.get("name").cloned())
        .map(|f| decode_header_words(&f));

    let is_textual = media_type.starts_with("text/");

    let raw_bytes = ctx.sections.get(&section_id).cloned();
    if raw_bytes.is_none() {
        ctx.warnings.push(Warning::MissingSection(section_id.clone()));
    }
    let raw_bytes = raw_bytes.unwrap_or_default();

    let default_charset = ctx.default_charset.to_string();
    let part_charset = charset.clone().unwrap_or(default_charset);

    let (bytes, text, warnings) = decode_transfer_encoding(&raw_bytes, &transfer_encoding, &part_charset, is_textual, &section_id);
    ctx.warnings.extend(warnings);

    let is_inline = disposition_kind.as_deref() == Some("inline") && content_id.is_some();
    let is_attachment_disposition = disposition_kind.as_deref() == Some("attachment");

    let part = MimePart {
        section_id: section_id.clone(),
        parent_section_id: parent_id,
        media_type: media_type.to_string(),
        params,
        charset: charset.clone(),
        transfer_encoding: transfer_encoding.clone(),
        disposition: disposition_kind.clone(),
        filename: filename.clone(),
        content_id: content_id.clone(),
        declared_size: size,
        bytes: bytes.clone(),
        text: text.clone(),
    };
    ctx.parts.push(part);

    let is_body_candidate = !force_attachment && is_textual && !is_attachment_disposition;

    if is_body_candidate {
        classify_body_text(media_type, text.unwrap_or_default())
    } else {
        let name = filename.unwrap_or_else(|| default_attachment_name(&section_id, media_type));
        if let Some(cid) = &content_id {
            if is_inline {
                ctx.inline_references.push(InlineReference {
                    content_id: cid.clone(),
                    section_id: section_id.clone(),
                });
            }
        }
        ctx.attachments.push(Attachment {
            section_id,
            filename: name,
            media_type: media_type.to_string(),
            content_id,
            is_inline,
            bytes,
        });
        ParsedBody::default()
    }
}

fn default_attachment_name(section_id: &str, media_type: &str) -> String {
    let ext = media_type.split('/').nth(1).unwrap_or("bin");
    format!("attachment-{section_id}.{ext}")
}

fn classify_body_text(media_type: &str, text: String) -> ParsedBody {
    match media_type {
        "text/html" => ParsedBody { text: None, html: Some(text) },
        "text/enriched" => ParsedBody {
            html: Some(enriched_to_html(&text)),
            text: Some(text),
        },
        _ => ParsedBody { text: Some(text), html: None },
    }
}

/// Minimal `text/enriched` (RFC 1896) to HTML upconversion: enriched's
/// line-folding rules treat a single newline as a space and a blank line
/// as a paragraph break, the inverse of plain text.
fn enriched_to_html(text: &str) -> String {
    let mut html = String::from("<p>");
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 {
                html.push_str("</p><p>");
            }
        } else {
            blank_run = 0;
            if !html.ends_with('>') {
                html.push(' ');
            }
            html.push_str(line.trim());
        }
    }
    html.push_str("</p>");
    html
}

/// Picks the first non-empty representation among children: used by
/// `alternative` (equivalent renditions of the same content), `related`
/// (primary body plus inline siblings already diverted to attachments)
/// and `signed` (content first, detached signature second).
fn pick_first(children: Vec<ParsedBody>) -> ParsedBody {
    let mut merged = ParsedBody::default();
    for child in children {
        if merged.html.is_none() && child.html.is_some() {
            merged.html = child.html;
        }
        if merged.text.is_none() && child.text.is_some() {
            merged.text = child.text;
        }
    }
    merged
}

/// Concatenates every child's body: text joined with a blank line, HTML
/// joined with a double line break. Used by `mixed`, `report`, `digest`,
/// `parallel` and any unrecognised multipart subtype.
fn concat_children(children: Vec<ParsedBody>) -> ParsedBody {
    let texts: Vec<String> = children.iter().filter_map(|c| c.text.clone()).collect();
    let htmls: Vec<String> = children.iter().filter_map(|c| c.html.clone()).collect();
    ParsedBody {
        text: (!texts.is_empty()).then(|| texts.join("\n\n")),
        html: (!htmls.is_empty()).then(|| htmls.join("<br><br>")),
    }
}

fn merge_multipart(subtype: &str, children: Vec<ParsedBody>) -> ParsedBody {
    match subtype {
        "alternative" | "related" | "signed" => pick_first(children),
        "encrypted" => ParsedBody {
            text: Some("[Encrypted message content]".to_string()),
            html: None,
        },
        _ => concat_children(children),
    }
}

#[allow(clippy::option_if_let_else)]
fn decode_transfer_encoding(
    raw: &[u8],
    encoding: &str,
    charset: &str,
    is_textual: bool,
    section_id: &str,
) -> (Vec<u8>, Option<String>, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut decode = |bytes: &[u8]| {
        let (text, repaired) = charset::decode_bytes_reporting_repair(bytes, charset);
        if repaired {
            warnings.push(Warning::MisencodingRepaired(section_id.to_string()));
        }
        text
    };

    let (out_bytes, text) = match encoding {
        "base64" => {
            let cleaned: String = raw.iter().filter(|b| !b.is_ascii_whitespace()).map(|&b| b as char).collect();
            match decode_base64(&cleaned) {
                Ok(bytes) => {
                    let text = is_textual.then(|| decode(&bytes));
                    (bytes, text)
                }
                Err(_) => (raw.to_vec(), is_textual.then(|| decode(raw))),
            }
        }
        "quoted-printable" => {
            let raw_str = String::from_utf8_lossy(raw).into_owned();
            let (decoded, repaired) = decode_quoted_printable_charset_reporting_repair(&raw_str, charset);
            if repaired {
                warnings.push(Warning::MisencodingRepaired(section_id.to_string()));
            }
            (decoded.clone().into_bytes(), is_textual.then_some(decoded))
        }
        "7bit" | "8bit" | "binary" | "" => {
            let text = is_textual.then(|| decode(raw));
            (raw.to_vec(), text)
        }
        other => {
            let text = is_textual.then(|| decode(raw));
            warnings.push(Warning::UnknownTransferEncoding {
                section_id: section_id.to_string(),
                encoding: other.to_string(),
            });
            (raw.to_vec(), text)
        }
    };

    (out_bytes, text, warnings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn text_leaf(subtype: &str, section_id: &str, content: &str) -> (BodyStructure, (String, Vec<u8>)) {
        let structure = BodyStructure::Text {
            subtype: subtype.to_string(),
            params: vec![("charset".to_string(), "utf-8".to_string())],
            id: None,
            description: None,
            encoding: "7bit".to_string(),
            size: content.len() as u32,
            lines: 1,
            disposition: None,
        };
        (structure, (section_id.to_string(), content.as_bytes().to_vec()))
    }

    #[test]
    fn single_part_root_gets_section_id_one() {
        let (structure, (id, bytes)) = text_leaf("plain", "1", "hello");
        let mut sections = HashMap::new();
        sections.insert(id, bytes);

        let result = parse(&structure, &sections, "utf-8");
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.parts[0].section_id, "1");
        assert_eq!(result.body.text.as_deref(), Some("hello"));
    }

    #[test]
    fn alternative_prefers_html_when_present() {
        let plain = BodyStructure::Text {
            subtype: "plain".to_string(),
            params: vec![],
            id: None,
            description: None,
            encoding: "7bit".to_string(),
            size: 5,
            lines: 1,
            disposition: None,
        };
        let html = BodyStructure::Text {
            subtype: "html".to_string(),
            params: vec![],
            id: None,
            description: None,
            encoding: "7bit".to_string(),
            size: 11,
            lines: 1,
            disposition: None,
        };
        let structure = BodyStructure::Multipart {
            bodies: vec![plain, html],
            subtype: "alternative".to_string(),
            disposition: None,
        };

        let mut sections = HashMap::new();
        sections.insert("1".to_string(), b"plain".to_vec());
        sections.insert("2".to_string(), b"<p>html</p>".to_vec());

        let result = parse(&structure, &sections, "utf-8");
        assert_eq!(result.body.html.as_deref(), Some("<p>html</p>"));
        assert_eq!(result.body.text.as_deref(), Some("plain"));
        assert_eq!(result.parts[0].section_id, "1");
        assert_eq!(result.parts[1].section_id, "2");
    }

    #[test]
    fn missing_section_warns_but_does_not_panic() {
        let (structure, _) = text_leaf("plain", "1", "hello");
        let sections = HashMap::new();
        let result = parse(&structure, &sections, "utf-8");
        assert!(result.warnings.contains(&Warning::MissingSection("1".to_string())));
    }

    #[test]
    fn inline_image_becomes_attachment_and_inline_reference() {
        let image = BodyStructure::Basic {
            media_type: "IMAGE".to_string(),
            media_subtype: "PNG".to_string(),
            params: vec![],
            id: Some("img001@x".to_string()),
            description: None,
            encoding: "base64".to_string(),
            size: 8,
            disposition: Some(Disposition {
                kind: "inline".to_string(),
                params: vec![],
            }),
        };
        let mut sections = HashMap::new();
        sections.insert("1".to_string(), b"AAAA".to_vec());

        let result = parse(&image, &sections, "utf-8");
        assert_eq!(result.attachments.len(), 1);
        assert!(result.attachments[0].is_inline);
        assert_eq!(result.inline_references.len(), 1);
        assert_eq!(result.inline_references[0].content_id, "img001@x");
    }

    #[test]
    fn encrypted_children_are_forced_to_attachments() {
        let child = BodyStructure::Text {
            subtype: "plain".to_string(),
            params: vec![],
            id: None,
            description: None,
            encoding: "7bit".to_string(),
            size: 4,
            lines: 1,
            disposition: None,
        };
        let structure = BodyStructure::Multipart {
            bodies: vec![child],
            subtype: "encrypted".to_string(),
            disposition: None,
        };
        let mut sections = HashMap::new();
        sections.insert("1".to_string(), b"body".to_vec());

        let result = parse(&structure, &sections, "utf-8");
        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.body.text.as_deref(), Some("[Encrypted message content]"));
    }

    #[test]
    fn raw_fallback_single_part_text() {
        let raw = b"From: a@b.com\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nhello there";
        let result = parse_raw_fallback(raw, "us-ascii");
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.parts[0].section_id, "1");
        assert_eq!(result.body.text.as_deref(), Some("hello there"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn raw_fallback_multipart_with_declared_boundary() {
        let raw = b"From: a@b.com\r\n\
Content-Type: multipart/alternative; boundary=xyz\r\n\
\r\n\
--xyz\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain body\r\n\
--xyz\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html body</p>\r\n\
--xyz--\r\n";
        let result = parse_raw_fallback(raw, "us-ascii");
        assert_eq!(result.parts.len(), 2);
        assert_eq!(result.body.text.as_deref(), Some("plain body"));
        assert_eq!(result.body.html.as_deref(), Some("<p>html body</p>"));
    }

    #[test]
    fn raw_fallback_multipart_sniffs_boundary_when_undeclared() {
        let raw = b"From: a@b.com\r\n\
Content-Type: multipart/mixed\r\n\
\r\n\
--recoveredmark1234\r\n\
Content-Type: text/plain\r\n\
\r\n\
body text\r\n\
--recoveredmark1234--\r\n";
        let result = parse_raw_fallback(raw, "us-ascii");
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.body.text.as_deref(), Some("body text"));
    }

    #[test]
    fn raw_fallback_multipart_without_recoverable_boundary_warns_and_falls_back() {
        let raw = b"From: a@b.com\r\nContent-Type: multipart/mixed\r\n\r\njust some body text with no markers";
        let result = parse_raw_fallback(raw, "us-ascii");
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.parts[0].section_id, "1");
        assert!(result.warnings.iter().any(|w| matches!(w, Warning::ParseFallback(_))));
    }
}
