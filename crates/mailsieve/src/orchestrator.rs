//! Ties the connection pool, MIME render pipeline and store together
//! behind the external operations spec.md §6 describes: listing folders,
//! syncing a folder's envelope state, and rendering a single message.
//!
//! This is the only module that knows about all three subsystems at
//! once — [`crate::pool`], [`crate::render`] and [`crate::store`] stay
//! mutually unaware of each other.

use std::collections::HashMap;

use chrono::Utc;

use mailsieve_imap::command::{FetchAttribute, FetchItems};
use mailsieve_imap::parser::{BodyStructure, FetchItem};
use mailsieve_imap::types::{Uid, UidSet};

use crate::account::Account;
use crate::pool::ConnectionPool;
use crate::render::parts::{self, ParseResult};
use crate::render::{self, RenderOptions, RenderResult};
use crate::service::mail::{self, Folder};
use crate::store::{
    AttachmentRecord, BlobStore, MessageId, MessageRecord, MimePartRecord, RenderCacheEntry,
    StoreRepository, RENDER_GENERATOR_VERSION,
};
use crate::{Error, Result};

/// Lists every folder reachable from an account, opening and closing a
/// short-lived connection dedicated to the listing (spec.md §6
/// `list_folders`; unlike [`render_message`] this does not need a
/// folder-selected session, so it bypasses the pool entirely).
///
/// # Errors
///
/// Returns an error if connecting, authenticating or issuing `LIST` fails.
pub async fn list_folders(account: &Account) -> Result<Vec<Folder>> {
    let client = mail::connect_and_login(account).await.map_err(|e| Error::Config(e.to_string()))?;
    let mut client = client;
    let folders = mail::list_folders(&mut client).await.map_err(|e| Error::Config(e.to_string()))?;
    client.logout().await.map_err(|e| Error::Config(e.to_string()))?;
    Ok(folders)
}

/// Synchronizes one folder's envelope/flag state into the store (spec.md
/// §6 `sync_folder`): selects the folder through the pool, detects a
/// UIDVALIDITY change and purges stale derived state, then fetches
/// envelope and flags for the given UID range and upserts each message.
///
/// `uid_range` is `(low, high)` inclusive; pass `(1, u32::MAX)` for the
/// whole mailbox.
///
/// # Errors
///
/// Returns an error if the pool, IMAP fetch, or store write fails.
pub async fn sync_folder(
    pool: &ConnectionPool,
    store: &StoreRepository,
    account: &Account,
    folder: &str,
    uid_range: (u32, u32),
) -> Result<usize> {
    let account_id = account.id.ok_or_else(|| Error::Config("account has no id".to_string()))?;

    let mut guard = pool.acquire(account, folder).await?;
    let uid_validity = guard.uid_validity();

    if let Some(existing) = store.get_folder_uid_validity(account_id, folder).await? {
        if existing != uid_validity {
            store.purge_folder(account_id, folder).await?;
        }
    }

    let (low, high) = uid_range;
    let uid_set = match (Uid::new(low), Uid::new(high)) {
        (Some(lo), Some(hi)) => UidSet::range(lo, hi),
        (Some(lo), None) => UidSet::single(lo),
        _ => return Ok(0),
    };

    let fetch_items = FetchItems::Items(vec![FetchAttribute::Uid, FetchAttribute::Flags, FetchAttribute::Envelope]);
    let responses = guard.client().uid_fetch(&uid_set, fetch_items).await?;

    store.set_folder_uid_validity(account_id, folder, uid_validity).await?;

    let mut synced = 0usize;
    for (_seq, items) in responses {
        let mut uid = None;
        let mut envelope = None;
        let mut flags = Vec::new();
        for item in items {
            match item {
                FetchItem::Uid(u) => uid = Some(u),
                FetchItem::Envelope(e) => envelope = Some(e),
                FetchItem::Flags(f) => flags = f.iter().map(|flag| flag.as_str().to_string()).collect(),
                _ => {}
            }
        }
        let Some(uid) = uid else { continue };
        let envelope = envelope.unwrap_or_default();

        let record = MessageRecord {
            id: MessageId::new(account_id, folder, uid.get()),
            uid_validity,
            subject: envelope.subject.unwrap_or_default(),
            from: envelope.from.first().map(mail::format_address).unwrap_or_default(),
            internal_date: envelope.date.as_deref().and_then(parse_envelope_date),
            flags,
        };
        store.upsert_message(&record).await?;
        synced += 1;
    }

    Ok(synced)
}

fn parse_envelope_date(raw: &str) -> Option<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc2822(raw).ok().map(|d| d.with_timezone(&Utc))
}

/// Renders a single message, following spec.md §4.8's pipeline:
///
/// 1. Cache lookup — a current [`RenderCacheEntry`] is returned directly.
/// 2. Fetch `BODYSTRUCTURE` through the pool.
/// 3. Determine and fetch the sections the body and inline references need.
/// 4. Parse the section tree ([`parts::parse`]).
/// 5. Select and sanitise the body ([`render::select_body`], `render::sanitize`).
/// 6. Persist MIME parts, attachments (deduplicated through the blob
///    store) and the render cache row.
/// 7. Return the [`RenderResult`].
///
/// `load_remote_override` carries a one-shot "load remote content for this
/// message" (or "block it") decision that does not touch `options`'s
/// account-level `block_remote` default; pass `None` to just use it as-is.
/// Note a render satisfied entirely from the cache does not re-run the
/// sanitiser, so the override only takes effect on a cache miss.
///
/// # Errors
///
/// Returns an error if the pool, IMAP fetch, store, or blob store fails.
pub async fn render_message(
    pool: &ConnectionPool,
    store: &StoreRepository,
    blobs: &BlobStore,
    account: &Account,
    folder: &str,
    uid: u32,
    options: &RenderOptions,
    load_remote_override: Option<bool>,
) -> Result<RenderResult> {
    let account_id = account.id.ok_or_else(|| Error::Config("account has no id".to_string()))?;
    let message_id = MessageId::new(account_id, folder, uid);

    if let Some(cached) = store.get_render_cache(&message_id).await? {
        if cached.is_current() {
            return Ok(cache_entry_to_result(cached));
        }
    }

    let options = &RenderOptions { load_remote_override, ..*options };

    let fetch_uid = Uid::new(uid).ok_or_else(|| Error::Config("uid must be nonzero".to_string()))?;
    let uid_set = UidSet::single(fetch_uid);

    let mut guard = pool.acquire(account, folder).await?;

    let structure_items = guard
        .client()
        .uid_fetch(&uid_set, FetchItems::Items(vec![FetchAttribute::Uid, FetchAttribute::BodyStructure]))
        .await?;

    let structure = structure_items.into_iter().flat_map(|(_, items)| items).find_map(|item| match item {
        FetchItem::BodyStructure(s) => Some(s),
        _ => None,
    });

    let default_charset = "us-ascii";

    // spec.md §4.6 "Boundary recovery": a server that fails to return a
    // BODYSTRUCTURE for this message (or returns one we can't find in the
    // response) still gets a best-effort render from its raw bytes, rather
    // than failing the whole request (spec.md §4.8 step 2's fallback policy).
    let parsed = match structure {
        Some(structure) => {
            let section_ids = parts::sections_to_fetch(&structure);
            let sections = fetch_sections(&mut guard, &uid_set, &section_ids).await?;
            parts::parse(&structure, &sections, default_charset)
        }
        None => {
            let raw = fetch_whole_message(&mut guard, &uid_set).await?;
            parts::parse_raw_fallback(&raw, default_charset)
        }
    };

    persist_parse_result(store, blobs, &message_id, &parsed).await?;

    let (content, is_html, select_warnings) = render::select_body(&parsed.body, options);
    let (final_content, render_warnings) = if is_html {
        let (html, warnings) = render::sanitize::render_html(&content, options, &parsed.inline_references, &message_id.to_string());
        (html, warnings)
    } else {
        (render::sanitize::render_plain(&content), Vec::new())
    };

    let mut warnings = parsed.warnings.clone();
    warnings.extend(select_warnings);
    warnings.extend(render_warnings);

    let result = RenderResult {
        text: (!is_html).then(|| final_content.clone()),
        html: is_html.then(|| final_content.clone()),
        is_html,
        attachments: visible_attachments(&parsed, options),
        warnings,
    };

    let entry = RenderCacheEntry {
        message_id: message_id.clone(),
        generator_version: RENDER_GENERATOR_VERSION,
        text: result.text.clone(),
        html: result.html.clone(),
        warnings: result.warnings.iter().map(ToString::to_string).collect(),
        created_at: Utc::now(),
    };
    store.put_render_cache(&entry).await?;

    Ok(result)
}

fn visible_attachments(parsed: &ParseResult, options: &RenderOptions) -> Vec<parts::Attachment> {
    parsed
        .attachments
        .iter()
        .filter(|a| options.show_inline_attachments || !a.is_inline)
        .cloned()
        .collect()
}

async fn fetch_sections(
    guard: &mut crate::pool::PoolGuard,
    uid_set: &UidSet,
    section_ids: &[String],
) -> Result<HashMap<String, Vec<u8>>> {
    let mut sections = HashMap::new();
    if section_ids.is_empty() {
        return Ok(sections);
    }

    let items = section_ids
        .iter()
        .map(|id| FetchAttribute::Body {
            section: Some(id.clone()),
            peek: true,
            partial: None,
        })
        .collect();

    let responses = guard.client().uid_fetch(uid_set, FetchItems::Items(items)).await?;
    for (_, items) in responses {
        for item in items {
            if let FetchItem::Body { section: Some(section), data: Some(data), .. } = item {
                sections.insert(section, data);
            }
        }
    }
    Ok(sections)
}

/// Fetches the whole message (`BODY.PEEK[]`) for the no-`BODYSTRUCTURE`
/// fallback path (spec.md §4.6 "Boundary recovery").
async fn fetch_whole_message(guard: &mut crate::pool::PoolGuard, uid_set: &UidSet) -> Result<Vec<u8>> {
    let item = FetchAttribute::Body { section: None, peek: true, partial: None };
    let responses = guard.client().uid_fetch(uid_set, FetchItems::Items(vec![item])).await?;
    for (_, items) in responses {
        for item in items {
            if let FetchItem::Body { data: Some(data), .. } = item {
                return Ok(data);
            }
        }
    }
    Ok(Vec::new())
}

async fn persist_parse_result(store: &StoreRepository, blobs: &BlobStore, message_id: &MessageId, parsed: &ParseResult) -> Result<()> {
    let mut part_records = Vec::with_capacity(parsed.parts.len());
    for part in &parsed.parts {
        let blob_ref = blobs.put(&part.bytes).await?;
        part_records.push(MimePartRecord {
            message_id: message_id.clone(),
            section_id: part.section_id.clone(),
            parent_section_id: part.parent_section_id.clone(),
            media_type: part.media_type.clone(),
            charset: part.charset.clone(),
            transfer_encoding: part.transfer_encoding.clone(),
            disposition: part.disposition.clone(),
            filename: part.filename.clone(),
            content_id: part.content_id.clone(),
            declared_size: part.declared_size,
            stored_size: part.bytes.len() as u64,
            sha256: blob_ref.clone(),
            blob_ref,
        });
    }
    store.replace_mime_parts(message_id, &part_records).await?;

    let mut attachment_records = Vec::with_capacity(parsed.attachments.len());
    for attachment in &parsed.attachments {
        let blob_ref = blobs.put(&attachment.bytes).await?;
        attachment_records.push(AttachmentRecord {
            message_id: message_id.clone(),
            section_id: attachment.section_id.clone(),
            filename: attachment.filename.clone(),
            media_type: attachment.media_type.clone(),
            content_id: attachment.content_id.clone(),
            is_inline: attachment.is_inline,
            size: attachment.bytes.len() as u64,
            sha256: blob_ref.clone(),
            blob_ref,
        });
    }
    store.replace_attachments(message_id, &attachment_records).await?;

    Ok(())
}

/// A cache hit does not carry typed [`Warning`]s (only their rendered
/// text, for diagnostics) and does not repeat the attachment list, which
/// the caller already has from the original sync.
fn cache_entry_to_result(entry: RenderCacheEntry) -> RenderResult {
    RenderResult {
        is_html: entry.html.is_some(),
        text: entry.text,
        html: entry.html,
        attachments: Vec::new(),
        warnings: Vec::new(),
    }
}

/// Fetches and returns the decoded bytes of a single attachment by section
/// id, reading it from the blob store by the SHA-256 recorded at sync time
/// (spec.md §6 `fetch_attachment`).
///
/// # Errors
///
/// Returns an error if the attachment is unknown or its blob is missing.
pub async fn fetch_attachment(store: &StoreRepository, blobs: &BlobStore, message_id: &MessageId, section_id: &str) -> Result<Vec<u8>> {
    let attachments = store.list_attachments(message_id).await?;
    let record = attachments
        .into_iter()
        .find(|a| a.section_id == section_id)
        .ok_or_else(|| Error::CacheMiss(format!("{message_id}#{section_id}")))?;
    blobs.get(&record.blob_ref).await
}

/// Builds the application-internal URL a rendered `cid:` reference is
/// rewritten to by [`render::sanitize::render_html`] (spec.md §4.7 "`cid:`
/// URLs are rewritten to an addressable reference"), so callers serving
/// rendered HTML can route it back to [`fetch_attachment`]. Must stay in
/// lockstep with [`render::sanitize::rewrite_cid_references`]'s format.
#[must_use]
pub fn cid_url(message_id: &MessageId, content_id: &str) -> String {
    format!("/mail/{message_id}/cid/{content_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_url_is_stable_for_same_message_and_cid() {
        let id = MessageId::new(crate::AccountId::new(1), "INBOX", 7);
        assert_eq!(cid_url(&id, "img1"), cid_url(&id, "img1"));
        assert_ne!(cid_url(&id, "img1"), cid_url(&id, "img2"));
    }
}
