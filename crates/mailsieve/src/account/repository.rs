//! Account storage repository.
//!
//! Accounts are plain local configuration: connection coordinates plus
//! an already-resolved [`Credential`]. The credential is serialized as
//! JSON into the same row; nothing here reaches out to a keyring or an
//! OAuth provider.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::credentials::Credential;
use super::model::{Account, AccountId, ImapConfig, Security};
use crate::Result;

/// Repository for account storage and retrieval.
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                imap_host TEXT NOT NULL,
                imap_port INTEGER NOT NULL,
                imap_security TEXT NOT NULL,
                imap_sni_host TEXT,
                imap_username TEXT NOT NULL,
                imap_credential_json TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email,
                   imap_host, imap_port, imap_security, imap_sni_host,
                   imap_username, imap_credential_json,
                   is_default
            FROM accounts
            ORDER BY is_default DESC, name ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email,
                   imap_host, imap_port, imap_security, imap_sni_host,
                   imap_username, imap_credential_json,
                   is_default
            FROM accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Get the default account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_default(&self) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email,
                   imap_host, imap_port, imap_security, imap_sni_host,
                   imap_username, imap_credential_json,
                   is_default
            FROM accounts
            WHERE is_default = 1
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Save an account (insert or update).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the credential
    /// cannot be serialized.
    pub async fn save(&self, account: &mut Account) -> Result<()> {
        let credential_json = serde_json::to_string(&account.imap.credential)?;

        if let Some(id) = account.id {
            sqlx::query(
                r"
                UPDATE accounts SET
                    name = ?, email = ?,
                    imap_host = ?, imap_port = ?, imap_security = ?, imap_sni_host = ?,
                    imap_username = ?, imap_credential_json = ?,
                    is_default = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.imap.host)
            .bind(i64::from(account.imap.port))
            .bind(security_to_string(account.imap.security))
            .bind(&account.imap.sni_host)
            .bind(&account.imap.username)
            .bind(&credential_json)
            .bind(account.is_default)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO accounts (
                    name, email,
                    imap_host, imap_port, imap_security, imap_sni_host,
                    imap_username, imap_credential_json,
                    is_default
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.imap.host)
            .bind(i64::from(account.imap.port))
            .bind(security_to_string(account.imap.security))
            .bind(&account.imap.sni_host)
            .bind(&account.imap.username)
            .bind(&credential_json)
            .bind(account.is_default)
            .execute(&self.pool)
            .await?;

            account.id = Some(AccountId::new(result.last_insert_rowid()));
        }

        // If this account is default, unset others
        if account.is_default
            && let Some(id) = account.id
        {
            sqlx::query("UPDATE accounts SET is_default = 0 WHERE id != ?")
                .bind(id.0)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Delete an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: AccountId) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert a database row to an Account.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    let credential_json: String = row.get("imap_credential_json");
    let credential: Credential =
        serde_json::from_str(&credential_json).unwrap_or_else(|_| Credential::Password(String::new()));

    Account {
        id: Some(AccountId::new(row.get("id"))),
        name: row.get("name"),
        email: row.get("email"),
        imap: ImapConfig {
            host: row.get("imap_host"),
            port: row.get::<i64, _>("imap_port") as u16,
            security: string_to_security(row.get("imap_security")),
            sni_host: row.get("imap_sni_host"),
            username: row.get("imap_username"),
            credential,
            ..ImapConfig::default()
        },
        is_default: row.get::<i64, _>("is_default") != 0,
    }
}

const fn security_to_string(security: Security) -> &'static str {
    match security {
        Security::None => "none",
        Security::Tls => "tls",
        Security::StartTls => "starttls",
    }
}

fn string_to_security(s: &str) -> Security {
    match s {
        "none" => Security::None,
        "starttls" => Security::StartTls,
        _ => Security::Tls,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_retrieve_account() {
        let repo = AccountRepository::in_memory().await.unwrap();

        let mut account = Account::with_email("test@example.com");
        account.imap.credential = Credential::Password("secret".to_string());

        repo.save(&mut account).await.unwrap();
        assert!(account.id.is_some());

        let retrieved = repo.get(account.id.unwrap()).await.unwrap();
        assert!(retrieved.is_some());
        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.email, "test@example.com");
        assert!(!retrieved.imap.credential.is_oauth());
    }

    #[tokio::test]
    async fn test_list_accounts() {
        let repo = AccountRepository::in_memory().await.unwrap();

        let mut account1 = Account::with_email("user1@example.com");
        account1.imap.credential = Credential::Password("secret".to_string());
        repo.save(&mut account1).await.unwrap();

        let mut account2 = Account::with_email("user2@example.com");
        account2.imap.credential = Credential::OAuthBearerAccessToken("tok".to_string());
        repo.save(&mut account2).await.unwrap();

        let accounts = repo.list().await.unwrap();
        assert_eq!(accounts.len(), 2);
    }

    #[tokio::test]
    async fn test_default_account() {
        let repo = AccountRepository::in_memory().await.unwrap();

        let mut account = Account::with_email("default@example.com");
        account.imap.credential = Credential::Password("secret".to_string());
        account.is_default = true;
        repo.save(&mut account).await.unwrap();

        let default = repo.get_default().await.unwrap();
        assert!(default.is_some());
        assert_eq!(default.unwrap().email, "default@example.com");
    }

    #[tokio::test]
    async fn test_credential_round_trips() {
        let repo = AccountRepository::in_memory().await.unwrap();
        let mut account = Account::with_email("oauth@example.com");
        account.imap.credential = Credential::XOAuth2AccessToken("abc123".to_string());
        repo.save(&mut account).await.unwrap();

        let retrieved = repo.get(account.id.unwrap()).await.unwrap().unwrap();
        assert!(retrieved.imap.credential.is_oauth());
    }
}
