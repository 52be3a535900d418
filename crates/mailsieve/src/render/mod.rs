//! MIME decoding and render pipeline.
//!
//! Walks a `BODYSTRUCTURE` tree plus its fetched section bytes
//! ([`parts`]), selects and sanitises the best body representation
//! ([`selector`], [`sanitize`]), and hands back the parts, attachments and
//! warnings the orchestrator persists.

pub mod parts;
pub mod sanitize;
pub mod selector;

pub use parts::{Attachment, InlineReference, MimePart, ParseResult, ParsedBody};
pub use selector::select_body;

use std::fmt;

/// Render-affecting options recognised by the selector and sanitiser
/// (spec.md §6 "Render" configuration options).
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Prefer HTML over plain text when a `multipart/alternative` offers both.
    pub prefer_html: bool,
    /// Replace external `http(s)://` URLs (images always, anchors per the
    /// REDESIGN FLAG generalisation) with a blocked placeholder.
    pub block_remote: bool,
    /// Clamp `<img>` width via an injected inline style, in pixels. `0`
    /// disables the clamp.
    pub max_image_width: u32,
    /// Whether to run the HTML sanitiser at all.
    pub sanitize_html: bool,
    /// Whether inline (`cid:`-referenced) attachments are also surfaced in
    /// `RenderResult.attachments`, or suppressed since they're already
    /// addressable through the rendered HTML.
    pub show_inline_attachments: bool,
    /// Per-message override of `block_remote`, set when the caller (e.g. a
    /// "load remote content" button on one open message) wants a one-shot
    /// decision that doesn't change the account-level default. `Some(true)`
    /// loads remote content for this render regardless of `block_remote`;
    /// `Some(false)` blocks it regardless; `None` defers to `block_remote`.
    pub load_remote_override: Option<bool>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            prefer_html: true,
            block_remote: true,
            max_image_width: 0,
            sanitize_html: true,
            show_inline_attachments: false,
            load_remote_override: None,
        }
    }
}

impl RenderOptions {
    /// The effective remote-content block decision for one render: the
    /// per-message override when set, else the account-level `block_remote`.
    #[must_use]
    pub fn effective_block_remote(&self) -> bool {
        self.load_remote_override.map_or(self.block_remote, |load_remote| !load_remote)
    }
}

/// A non-fatal condition surfaced alongside a render result (spec.md §7
/// `DecodeWarning`). Never aborts rendering; accumulated and returned to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A section id named by the `BODYSTRUCTURE` had no fetched bytes.
    MissingSection(String),
    /// A declared charset was unknown; fell back to statistical detection.
    UnknownCharset {
        /// Section whose charset was unrecognised.
        section_id: String,
        /// The alias that failed to normalise.
        charset: String,
    },
    /// Double-encoded (mojibake) text was detected and repaired.
    MisencodingRepaired(String),
    /// A Content-Transfer-Encoding value was not recognised; bytes passed
    /// through unmodified.
    UnknownTransferEncoding {
        /// Section carrying the unrecognised encoding.
        section_id: String,
        /// The encoding token as declared.
        encoding: String,
    },
    /// A `cid:` reference in the rendered HTML had no matching inline part.
    CidNotFound(String),
    /// An external URL was rewritten to `#blocked` under `block_remote`.
    BlockedRemoteContent,
    /// A `<script>` block was removed by the sanitiser.
    RemovedScript,
    /// No body candidate existed; a placeholder body was returned.
    EmptyBody,
    /// No `BODYSTRUCTURE` was available; the raw-body boundary-recovery
    /// fallback (spec.md §4.6 "Boundary recovery") was used instead, with
    /// the given reason when recovery itself was incomplete.
    ParseFallback(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSection(id) => write!(f, "section {id} was not fetched"),
            Self::UnknownCharset { section_id, charset } => {
                write!(f, "section {section_id}: unknown charset {charset:?}, used statistical detection")
            }
            Self::MisencodingRepaired(id) => write!(f, "section {id}: repaired double-encoded text"),
            Self::UnknownTransferEncoding { section_id, encoding } => {
                write!(f, "section {section_id}: unknown transfer encoding {encoding:?}, passed through")
            }
            Self::CidNotFound(cid) => write!(f, "cid:{cid} has no matching inline attachment"),
            Self::BlockedRemoteContent => write!(f, "blocked remote content"),
            Self::RemovedScript => write!(f, "removed a <script> block"),
            Self::EmptyBody => write!(f, "message had no renderable body"),
            Self::ParseFallback(reason) => write!(f, "parsed from raw body without BODYSTRUCTURE: {reason}"),
        }
    }
}

/// The final product handed back to the orchestrator's caller (spec.md §6
/// `render_message`).
#[derive(Debug, Clone, Default)]
pub struct RenderResult {
    /// Rendered plain text, if selected.
    pub text: Option<String>,
    /// Rendered (sanitised) HTML, if selected.
    pub html: Option<String>,
    /// `true` when `html` is the selected representation.
    pub is_html: bool,
    /// Attachments discovered while parsing.
    pub attachments: Vec<Attachment>,
    /// Accumulated non-fatal warnings.
    pub warnings: Vec<Warning>,
}
