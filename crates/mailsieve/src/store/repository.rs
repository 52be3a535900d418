//! Persistence for messages, MIME parts, attachments and the render cache.
//!
//! Same `sqlx` + SQLite foundation as [`crate::account::AccountRepository`];
//! rows are keyed by the message's `(account, folder, uid)` storage key
//! (spec.md §3 "Message identity").

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{AttachmentRecord, MessageId, MessageRecord, MimePartRecord, RenderCacheEntry};
use crate::{AccountId, Result};

/// Repository for the sync pipeline's derived state.
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    /// Opens (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Creates an in-memory repository, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                storage_key TEXT PRIMARY KEY,
                account_id INTEGER NOT NULL,
                folder TEXT NOT NULL,
                uid INTEGER NOT NULL,
                uid_validity INTEGER NOT NULL,
                subject TEXT NOT NULL,
                from_display TEXT NOT NULL,
                internal_date TEXT,
                flags_json TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mime_parts (
                message_key TEXT NOT NULL,
                section_id TEXT NOT NULL,
                parent_section_id TEXT,
                media_type TEXT NOT NULL,
                charset TEXT,
                transfer_encoding TEXT NOT NULL,
                disposition TEXT,
                filename TEXT,
                content_id TEXT,
                declared_size INTEGER NOT NULL,
                stored_size INTEGER NOT NULL,
                sha256 TEXT NOT NULL,
                blob_ref TEXT NOT NULL,
                PRIMARY KEY (message_key, section_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS attachments (
                message_key TEXT NOT NULL,
                section_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                media_type TEXT NOT NULL,
                content_id TEXT,
                is_inline INTEGER NOT NULL,
                size INTEGER NOT NULL,
                sha256 TEXT NOT NULL,
                blob_ref TEXT NOT NULL,
                PRIMARY KEY (message_key, section_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folder_state (
                account_id INTEGER NOT NULL,
                folder TEXT NOT NULL,
                uid_validity INTEGER NOT NULL,
                PRIMARY KEY (account_id, folder)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS render_cache (
                message_key TEXT PRIMARY KEY,
                generator_version INTEGER NOT NULL,
                text TEXT,
                html TEXT,
                warnings_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts a message's envelope/flag state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_message(&self, message: &MessageRecord) -> Result<()> {
        let flags_json = serde_json::to_string(&message.flags)?;
        sqlx::query(
            r"
            INSERT INTO messages (
                storage_key, account_id, folder, uid, uid_validity,
                subject, from_display, internal_date, flags_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(storage_key) DO UPDATE SET
                uid_validity = excluded.uid_validity,
                subject = excluded.subject,
                from_display = excluded.from_display,
                internal_date = excluded.internal_date,
                flags_json = excluded.flags_json
            ",
        )
        .bind(message.id.storage_key())
        .bind(message.id.account_id.0)
        .bind(&message.id.folder)
        .bind(message.id.uid)
        .bind(message.uid_validity)
        .bind(&message.subject)
        .bind(&message.from)
        .bind(message.internal_date.map(|d| d.to_rfc3339()))
        .bind(flags_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replaces every MIME part row for a message (a re-sync fully
    /// supersedes the previous section tree).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn replace_mime_parts(&self, message_id: &MessageId, parts: &[MimePartRecord]) -> Result<()> {
        let key = message_id.storage_key();
        sqlx::query("DELETE FROM mime_parts WHERE message_key = ?")
            .bind(&key)
            .execute(&self.pool)
            .await?;

        for part in parts {
            sqlx::query(
                r"
                INSERT INTO mime_parts (
                    message_key, section_id, parent_section_id, media_type, charset,
                    transfer_encoding, disposition, filename, content_id,
                    declared_size, stored_size, sha256, blob_ref
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&key)
            .bind(&part.section_id)
            .bind(&part.parent_section_id)
            .bind(&part.media_type)
            .bind(&part.charset)
            .bind(&part.transfer_encoding)
            .bind(&part.disposition)
            .bind(&part.filename)
            .bind(&part.content_id)
            .bind(part.declared_size)
            .bind(i64::try_from(part.stored_size).unwrap_or(i64::MAX))
            .bind(&part.sha256)
            .bind(&part.blob_ref)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Replaces every attachment row for a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn replace_attachments(&self, message_id: &MessageId, attachments: &[AttachmentRecord]) -> Result<()> {
        let key = message_id.storage_key();
        sqlx::query("DELETE FROM attachments WHERE message_key = ?")
            .bind(&key)
            .execute(&self.pool)
            .await?;

        for att in attachments {
            sqlx::query(
                r"
                INSERT INTO attachments (
                    message_key, section_id, filename, media_type, content_id,
                    is_inline, size, sha256, blob_ref
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&key)
            .bind(&att.section_id)
            .bind(&att.filename)
            .bind(&att.media_type)
            .bind(&att.content_id)
            .bind(att.is_inline)
            .bind(i64::try_from(att.size).unwrap_or(i64::MAX))
            .bind(&att.sha256)
            .bind(&att.blob_ref)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Lists every attachment for a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_attachments(&self, message_id: &MessageId) -> Result<Vec<AttachmentRecord>> {
        let rows = sqlx::query(
            r"
            SELECT section_id, filename, media_type, content_id, is_inline, size, sha256, blob_ref
            FROM attachments WHERE message_key = ?
            ",
        )
        .bind(message_id.storage_key())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AttachmentRecord {
                message_id: message_id.clone(),
                section_id: row.get("section_id"),
                filename: row.get("filename"),
                media_type: row.get("media_type"),
                content_id: row.get("content_id"),
                is_inline: row.get::<i64, _>("is_inline") != 0,
                size: row.get::<i64, _>("size").try_into().unwrap_or(0),
                sha256: row.get("sha256"),
                blob_ref: row.get("blob_ref"),
            })
            .collect())
    }

    /// Looks up the current render cache row for a message, if any (this
    /// does not filter by generator version — callers check
    /// [`RenderCacheEntry::is_current`] themselves, per spec.md §8
    /// property 8, so a stale hit is still observable for diagnostics).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_render_cache(&self, message_id: &MessageId) -> Result<Option<RenderCacheEntry>> {
        let row = sqlx::query(
            r"
            SELECT generator_version, text, html, warnings_json, created_at
            FROM render_cache WHERE message_key = ?
            ",
        )
        .bind(message_id.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<RenderCacheEntry> {
            let warnings_json: String = row.get("warnings_json");
            let created_at: String = row.get("created_at");
            Ok(RenderCacheEntry {
                message_id: message_id.clone(),
                generator_version: row.get("generator_version"),
                text: row.get("text"),
                html: row.get("html"),
                warnings: serde_json::from_str(&warnings_json).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })
        .transpose()
    }

    /// Overwrites the render cache row for a message (spec.md §5: "a later
    /// writer with the same generator version overwrites").
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or `warnings` can't be
    /// serialized.
    pub async fn put_render_cache(&self, entry: &RenderCacheEntry) -> Result<()> {
        let warnings_json = serde_json::to_string(&entry.warnings)?;
        sqlx::query(
            r"
            INSERT INTO render_cache (message_key, generator_version, text, html, warnings_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_key) DO UPDATE SET
                generator_version = excluded.generator_version,
                text = excluded.text,
                html = excluded.html,
                warnings_json = excluded.warnings_json,
                created_at = excluded.created_at
            ",
        )
        .bind(entry.message_id.storage_key())
        .bind(entry.generator_version)
        .bind(&entry.text)
        .bind(&entry.html)
        .bind(warnings_json)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the UIDVALIDITY observed the last time this folder was
    /// synced, if ever.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_folder_uid_validity(&self, account_id: AccountId, folder: &str) -> Result<Option<u32>> {
        let row = sqlx::query("SELECT uid_validity FROM folder_state WHERE account_id = ? AND folder = ?")
            .bind(account_id.0)
            .bind(folder)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("uid_validity") as u32))
    }

    /// Records the UIDVALIDITY observed for a folder at sync time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_folder_uid_validity(&self, account_id: AccountId, folder: &str, uid_validity: u32) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO folder_state (account_id, folder, uid_validity)
            VALUES (?, ?, ?)
            ON CONFLICT(account_id, folder) DO UPDATE SET uid_validity = excluded.uid_validity
            ",
        )
        .bind(account_id.0)
        .bind(folder)
        .bind(uid_validity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Purges every derived artifact (parts, attachments, cache — messages
    /// themselves are left to the caller) for an entire folder, per
    /// spec.md §3: "A folder's UIDVALIDITY change purges every derived
    /// artifact... for that folder."
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn purge_folder(&self, account_id: AccountId, folder: &str) -> Result<()> {
        let keys: Vec<String> = sqlx::query("SELECT storage_key FROM messages WHERE account_id = ? AND folder = ?")
            .bind(account_id.0)
            .bind(folder)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get("storage_key"))
            .collect();

        for key in &keys {
            sqlx::query("DELETE FROM mime_parts WHERE message_key = ?").bind(key).execute(&self.pool).await?;
            sqlx::query("DELETE FROM attachments WHERE message_key = ?").bind(key).execute(&self.pool).await?;
            sqlx::query("DELETE FROM render_cache WHERE message_key = ?").bind(key).execute(&self.pool).await?;
        }
        sqlx::query("DELETE FROM messages WHERE account_id = ? AND folder = ?")
            .bind(account_id.0)
            .bind(folder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::model::RENDER_GENERATOR_VERSION;

    fn sample_message(account: AccountId, folder: &str, uid: u32) -> MessageRecord {
        MessageRecord {
            id: MessageId::new(account, folder, uid),
            uid_validity: 1,
            subject: "Hello".to_string(),
            from: "\"A\" <a@example.com>".to_string(),
            internal_date: None,
            flags: vec!["\\Seen".to_string()],
        }
    }

    #[tokio::test]
    async fn render_cache_round_trips() {
        let repo = StoreRepository::in_memory().await.unwrap();
        let id = MessageId::new(AccountId::new(1), "INBOX", 42);
        let entry = RenderCacheEntry {
            message_id: id.clone(),
            generator_version: RENDER_GENERATOR_VERSION,
            text: Some("hi".to_string()),
            html: Some("<p>hi</p>".to_string()),
            warnings: vec!["unknown charset".to_string()],
            created_at: Utc::now(),
        };
        repo.put_render_cache(&entry).await.unwrap();

        let fetched = repo.get_render_cache(&id).await.unwrap().unwrap();
        assert!(fetched.is_current());
        assert_eq!(fetched.text.as_deref(), Some("hi"));
        assert_eq!(fetched.warnings, vec!["unknown charset".to_string()]);
    }

    #[tokio::test]
    async fn render_cache_miss_returns_none() {
        let repo = StoreRepository::in_memory().await.unwrap();
        let id = MessageId::new(AccountId::new(1), "INBOX", 1);
        assert!(repo.get_render_cache(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_folder_removes_parts_attachments_and_cache() {
        let repo = StoreRepository::in_memory().await.unwrap();
        let account = AccountId::new(1);
        let id = MessageId::new(account, "INBOX", 7);
        repo.upsert_message(&sample_message(account, "INBOX", 7)).await.unwrap();
        repo.put_render_cache(&RenderCacheEntry {
            message_id: id.clone(),
            generator_version: RENDER_GENERATOR_VERSION,
            text: Some("hi".to_string()),
            html: None,
            warnings: vec![],
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        repo.purge_folder(account, "INBOX").await.unwrap();

        assert!(repo.get_render_cache(&id).await.unwrap().is_none());
    }
}
