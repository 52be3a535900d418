//! Body selector (spec.md §4.7 "Body selection"): picks one of the two
//! merged representations a MIME parse produces, given `RenderOptions`.

use crate::render::parts::ParsedBody;
use crate::render::{RenderOptions, Warning};

/// Selects `(content, is_html)` from a merged body.
///
/// Prefers non-empty HTML when `options.prefer_html` is set; otherwise
/// prefers non-empty plain text. Falls back to the other representation
/// when the preferred one is absent or blank, and finally to an empty
/// placeholder with `Warning::EmptyBody` when neither carries content.
#[must_use]
pub fn select_body(body: &ParsedBody, options: &RenderOptions) -> (String, bool, Vec<Warning>) {
    let html = body.html.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let text = body.text.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let (content, is_html) = if options.prefer_html {
        match (html, text) {
            (Some(h), _) => (h.to_string(), true),
            (None, Some(t)) => (t.to_string(), false),
            (None, None) => (String::new(), false),
        }
    } else {
        match (text, html) {
            (Some(t), _) => (t.to_string(), false),
            (None, Some(h)) => (h.to_string(), true),
            (None, None) => (String::new(), false),
        }
    };

    if content.is_empty() {
        (String::new(), false, vec![Warning::EmptyBody])
    } else {
        (content, is_html, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_html_when_both_present_and_prefer_html_set() {
        let body = ParsedBody {
            text: Some("plain".to_string()),
            html: Some("<p>html</p>".to_string()),
        };
        let options = RenderOptions { prefer_html: true, ..RenderOptions::default() };
        let (content, is_html, warnings) = select_body(&body, &options);
        assert_eq!(content, "<p>html</p>");
        assert!(is_html);
        assert!(warnings.is_empty());
    }

    #[test]
    fn falls_back_to_text_when_html_absent() {
        let body = ParsedBody { text: Some("plain".to_string()), html: None };
        let options = RenderOptions::default();
        let (content, is_html, warnings) = select_body(&body, &options);
        assert_eq!(content, "plain");
        assert!(!is_html);
        assert!(warnings.is_empty());
    }

    #[test]
    fn falls_back_to_html_when_prefer_html_is_false_and_text_absent() {
        let body = ParsedBody { text: None, html: Some("<p>x</p>".to_string()) };
        let options = RenderOptions { prefer_html: false, ..RenderOptions::default() };
        let (content, is_html, warnings) = select_body(&body, &options);
        assert_eq!(content, "<p>x</p>");
        assert!(is_html);
        assert!(warnings.is_empty());
    }

    #[test]
    fn empty_body_produces_warning() {
        let body = ParsedBody::default();
        let options = RenderOptions::default();
        let (content, is_html, warnings) = select_body(&body, &options);
        assert!(content.is_empty());
        assert!(!is_html);
        assert_eq!(warnings, vec![Warning::EmptyBody]);
    }

    #[test]
    fn whitespace_only_body_is_treated_as_empty() {
        let body = ParsedBody { text: Some("   \n  ".to_string()), html: None };
        let options = RenderOptions::default();
        let (content, _, warnings) = select_body(&body, &options);
        assert!(content.is_empty());
        assert_eq!(warnings, vec![Warning::EmptyBody]);
    }
}
