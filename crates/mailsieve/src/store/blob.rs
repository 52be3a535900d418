//! Content-addressed blob storage for decoded MIME part bytes.
//!
//! Attachments and inline parts are written once per distinct SHA-256 and
//! referenced by every [`crate::store::MimePartRecord`]/[`crate::store::AttachmentRecord`]
//! that happens to carry the same bytes (spec.md §4.8 step 6: "deduplicated
//! by SHA-256").

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::Result;

/// A filesystem-backed content-addressed store, `sha256(bytes)` → file.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens (creating if needed) a blob store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Hashes `bytes` and returns the hex-encoded digest, without writing
    /// anything. Callers use this to check whether a write can be skipped.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Writes `bytes` under its own SHA-256 digest, unless a blob with that
    /// digest already exists. Returns the digest (also the blob reference
    /// stored on [`crate::store::MimePartRecord::blob_ref`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put(&self, bytes: &[u8]) -> Result<String> {
        let digest = Self::digest(bytes);
        let path = self.path_for(&digest);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(digest);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(digest)
    }

    /// Reads back the bytes for a previously-stored digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is missing or unreadable.
    pub async fn get(&self, digest: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_for(digest)).await?)
    }

    /// Splits the digest into a two-level directory fan-out
    /// (`ab/cdef...`) so no single directory accumulates millions of
    /// entries on large mailboxes.
    fn path_for(&self, digest: &str) -> PathBuf {
        let (prefix, rest) = digest.split_at(2.min(digest.len()));
        Path::new(&self.root).join(prefix).join(rest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        let digest = store.put(b"hello world").await.unwrap();
        let back = store.get(&digest).await.unwrap();
        assert_eq!(back, b"hello world");
    }

    #[tokio::test]
    async fn duplicate_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        let d1 = store.put(b"same bytes").await.unwrap();
        let d2 = store.put(b"same bytes").await.unwrap();
        assert_eq!(d1, d2);
    }
}
