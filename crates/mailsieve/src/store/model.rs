//! Data model for synchronized messages, MIME parts, attachments and the
//! render cache.
//!
//! Mirrors the teacher's account/cache model structs (plain `serde`-free
//! data structs, storage concerns pushed into the repository) but carries
//! the fields `spec.md` §3/§6 require: section trees, SHA-256 content
//! addressing, and a generator-versioned render cache.

use chrono::{DateTime, Utc};

use crate::AccountId;

/// Bumped whenever the rendering contract (§4.7) changes in a way that
/// would produce different output for previously-cached messages. A cache
/// row whose `generator_version` differs from this constant is stale and
/// must be rebuilt (§4.8 step 1, §8 property 8).
pub const RENDER_GENERATOR_VERSION: i64 = 1;

/// Stable identity of a message: `(account, folder, uid)` per spec.md §3.
///
/// `uidvalidity` travels alongside rather than inside the identity itself —
/// a UIDVALIDITY change invalidates every derived artifact for the folder
/// without changing what "the message at this UID" conceptually refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// Owning account.
    pub account_id: AccountId,
    /// Server-native folder name (modified UTF-7 preserved, per spec.md §3).
    pub folder: String,
    /// Per-folder UID.
    pub uid: u32,
}

impl MessageId {
    /// Creates a new message identity.
    #[must_use]
    pub fn new(account_id: AccountId, folder: impl Into<String>, uid: u32) -> Self {
        Self {
            account_id,
            folder: folder.into(),
            uid,
        }
    }

    /// A stable, opaque storage key combining all three identity fields.
    ///
    /// Not meant for display: the folder name may contain `/`, so this is
    /// only guaranteed unique, not parseable back into its parts.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}\u{1}{}\u{1}{}", self.account_id.0, self.folder, self.uid)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.folder, self.uid)
    }
}

/// A synchronized message's envelope and flag state (spec.md §3 "Message
/// identity" + "Envelope" + UIDVALIDITY).
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Stable identity.
    pub id: MessageId,
    /// UIDVALIDITY of the folder at sync time.
    pub uid_validity: u32,
    /// Decoded subject (already passed through RFC 2047).
    pub subject: String,
    /// Formatted "from" display, e.g. `"Name" <mbox@host>`.
    pub from: String,
    /// Parsed date, when the server's INTERNALDATE/envelope date parsed.
    pub internal_date: Option<DateTime<Utc>>,
    /// Raw IMAP flags at last sync (`\Seen`, `\Flagged`, ...).
    pub flags: Vec<String>,
}

/// A persisted MIME part (spec.md §3 "MIME part record").
#[derive(Debug, Clone)]
pub struct MimePartRecord {
    /// Owning message.
    pub message_id: MessageId,
    /// Section id, e.g. `"1"`, `"1.2.3"`.
    pub section_id: String,
    /// Parent section id, `None` for the root.
    pub parent_section_id: Option<String>,
    /// Lower-cased `type/subtype`.
    pub media_type: String,
    /// Charset used to decode this part's text, if textual.
    pub charset: Option<String>,
    /// Declared Content-Transfer-Encoding.
    pub transfer_encoding: String,
    /// Content-Disposition (`"inline"`, `"attachment"`, or `None`).
    pub disposition: Option<String>,
    /// Original (RFC 2231/2047-decoded) filename, if any.
    pub filename: Option<String>,
    /// Content-ID with angle brackets stripped.
    pub content_id: Option<String>,
    /// Declared size in octets (from BODYSTRUCTURE).
    pub declared_size: u32,
    /// Actual decoded byte length stored.
    pub stored_size: u64,
    /// SHA-256 of the decoded bytes, hex-encoded.
    pub sha256: String,
    /// Reference into the blob store (normally the hex digest itself).
    pub blob_ref: String,
}

/// A persisted attachment (spec.md §3 "Attachment record").
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    /// Owning message.
    pub message_id: MessageId,
    /// Section id this attachment was sourced from.
    pub section_id: String,
    /// Sanitised filename (safe for use in a `Content-Disposition` or URL).
    pub filename: String,
    /// Lower-cased `type/subtype`.
    pub media_type: String,
    /// Content-ID with angle brackets stripped, if this is usable by a
    /// `cid:` reference.
    pub content_id: Option<String>,
    /// Whether this attachment is referenced inline (§3 invariant:
    /// `is_inline ⇒ content_id present OR disposition = "inline"`).
    pub is_inline: bool,
    /// Size in bytes of the decoded content.
    pub size: u64,
    /// SHA-256 of the decoded bytes, hex-encoded.
    pub sha256: String,
    /// Reference into the blob store.
    pub blob_ref: String,
}

/// A render cache row (spec.md §3 "Render cache entry").
#[derive(Debug, Clone)]
pub struct RenderCacheEntry {
    /// Owning message.
    pub message_id: MessageId,
    /// Generator version this row was produced by.
    pub generator_version: i64,
    /// Rendered plain text, if a body was selected.
    pub text: Option<String>,
    /// Rendered (sanitised) HTML, if a body was selected.
    pub html: Option<String>,
    /// Accumulated non-fatal decode warnings, serialized as JSON strings.
    pub warnings: Vec<String>,
    /// When this row was written.
    pub created_at: DateTime<Utc>,
}

impl RenderCacheEntry {
    /// Whether this cache row can satisfy a render request right now
    /// (spec.md §4.8 step 1, §8 property 8).
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.generator_version == RENDER_GENERATOR_VERSION
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_id_storage_key_is_stable_and_distinguishes_folders() {
        let a = MessageId::new(AccountId::new(1), "INBOX", 42);
        let b = MessageId::new(AccountId::new(1), "Archive", 42);
        assert_ne!(a.storage_key(), b.storage_key());
        assert_eq!(a.storage_key(), MessageId::new(AccountId::new(1), "INBOX", 42).storage_key());
    }

    #[test]
    fn cache_entry_stale_when_generator_version_differs() {
        let entry = RenderCacheEntry {
            message_id: MessageId::new(AccountId::new(1), "INBOX", 1),
            generator_version: RENDER_GENERATOR_VERSION - 1,
            text: None,
            html: None,
            warnings: Vec::new(),
            created_at: Utc::now(),
        };
        assert!(!entry.is_current());
    }
}
