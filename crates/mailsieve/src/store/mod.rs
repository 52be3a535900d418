//! Persisted storage for synchronized messages and their rendered output.
//!
//! Mirrors the teacher's offline message cache in spirit (same sqlx +
//! SQLite foundation) but stores the actual data model the sync
//! pipeline needs: messages, MIME parts, attachments and render cache
//! entries, plus a content-addressed blob store for decoded bytes.

mod blob;
mod model;
mod repository;

pub use blob::BlobStore;
pub use model::{
    AttachmentRecord, MessageRecord, MimePartRecord, RenderCacheEntry, RENDER_GENERATOR_VERSION,
};
pub use repository::StoreRepository;
