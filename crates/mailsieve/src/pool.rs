//! Connection pool: one reusable authenticated, folder-selected session per
//! account (spec.md §4.2).
//!
//! Mirrors the teacher's `sqlx::SqlitePool` foundation in spirit — a shared
//! handle guarding a single underlying resource rather than a pool of many —
//! but the resource here is a single-writer IMAP session, not a database
//! connection: IMAP tagged responses can interleave arbitrarily with
//! untagged data, so at most one command may be outstanding on a
//! connection at a time (spec.md §5 "Scheduling model").
//!
//! The exclusive-access discipline is the [`tokio::sync::Mutex`] guarding
//! each account's slot: whatever is left inside the guard when it drops
//! *is* the cached session, so a normal [`acquire`](ConnectionPool::acquire)
//! → use → drop cycle keeps the connection alive for reuse with no extra
//! bookkeeping, and [`release`](ConnectionPool::release) with `close: true`
//! (or [`invalidate`](ConnectionPool::invalidate)) simply empties the slot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use mailsieve_imap::connection::{Client, ImapStream, connect_plain, connect_tls};
use mailsieve_imap::types::MailboxStatus;

use crate::account::{Account, AccountId, Credential};
use crate::service::mail::{AuthClient, SelectedClient};
use crate::{Error, Result};

/// A cached, folder-selected session plus enough state to decide whether a
/// subsequent `acquire` for a different folder must re-`SELECT`.
struct PooledSession {
    client: SelectedClient,
    folder: String,
    uid_validity: u32,
}

/// One logical acquirer at a time per account (spec.md §4.2).
///
/// `ConnectionPool` is process-wide shared state in the teacher's
/// application but, per spec.md §9 "Global singletons", must also be
/// constructible in isolation for tests — hence a plain `new()` rather
/// than a `static`.
#[derive(Default)]
pub struct ConnectionPool {
    sessions: RwLock<HashMap<AccountId, Arc<Mutex<Option<PooledSession>>>>>,
}

impl ConnectionPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, account_id: AccountId) -> Arc<Mutex<Option<PooledSession>>> {
        if let Some(slot) = self.sessions.read().await.get(&account_id) {
            return Arc::clone(slot);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(account_id).or_insert_with(|| Arc::new(Mutex::new(None))))
    }

    /// Returns the existing selected session for `account`/`folder` if one
    /// is cached and ready, otherwise opens and authenticates a fresh
    /// connection and selects `folder` (spec.md §4.2: "acquire ... returns
    /// the existing open session or opens a new one").
    ///
    /// Blocks until any other acquirer for the same account releases its
    /// guard, which is the pool's exclusivity guarantee.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, authenticating or selecting fails.
    pub async fn acquire(&self, account: &Account, folder: &str) -> Result<PoolGuard> {
        let account_id = account.id.ok_or_else(|| Error::Config("account has no id".to_string()))?;
        let slot = self.slot(account_id).await;
        let mut guard = Arc::clone(&slot).lock_owned().await;

        let needs_reopen = match guard.as_ref() {
            Some(session) => session.folder != folder,
            None => true,
        };

        if needs_reopen {
            let taken = guard.take();
            let session = match taken {
                Some(session) if session.folder == folder => session,
                Some(session) => {
                    let auth = session.client.close().await?;
                    select_into(auth, folder).await?
                }
                None => {
                    let auth = open_and_login(account).await?;
                    select_into(auth, folder).await?
                }
            };
            *guard = Some(session);
        }

        Ok(PoolGuard { guard })
    }

    /// Releases a previously acquired session: closes it when `close` is
    /// `true`, otherwise leaves it cached for the next `acquire` (spec.md
    /// §4.2).
    pub fn release(&self, mut guard: PoolGuard, close: bool) {
        if close {
            *guard.guard = None;
        }
    }

    /// Drops a single account's cached session without closing it
    /// gracefully on the wire (spec.md §7: the transport already observed
    /// an unrecoverable error, so there is nothing left to `LOGOUT`).
    pub async fn invalidate(&self, account_id: AccountId) {
        if let Some(slot) = self.sessions.read().await.get(&account_id) {
            *slot.lock().await = None;
        }
    }

    /// Tears down every cached session (spec.md §4.2 `invalidate_all`).
    pub async fn invalidate_all(&self) {
        let sessions = self.sessions.read().await;
        for slot in sessions.values() {
            *slot.lock().await = None;
        }
    }
}

/// RAII handle returned by [`ConnectionPool::acquire`].
///
/// Dropping the guard without calling
/// [`release`](ConnectionPool::release) keeps the session cached — the
/// slot's `Option` simply retains whatever is in it, so there is nothing
/// extra to do on the common path (spec.md §9 "Ownership of the
/// connection": release on all exit paths is automatic here because the
/// resource lives inside the lock itself, not beside it).
pub struct PoolGuard {
    guard: OwnedMutexGuard<Option<PooledSession>>,
}

impl PoolGuard {
    /// Mutable access to the selected client for issuing commands.
    ///
    /// # Panics
    ///
    /// Panics if called after the guard's session has been invalidated
    /// mid-use, which does not happen through this module's public API.
    pub fn client(&mut self) -> &mut SelectedClient {
        let session = self.guard.as_mut().expect("pool guard always holds a session while live");
        &mut session.client
    }

    /// The UIDVALIDITY observed at SELECT time for the folder this guard
    /// is scoped to.
    #[must_use]
    pub fn uid_validity(&self) -> u32 {
        self.guard.as_ref().map_or(0, |s| s.uid_validity)
    }
}

async fn open_and_login(account: &Account) -> Result<AuthClient> {
    let stream = match account.imap.security {
        crate::Security::Tls => {
            connect_tls(&account.imap.host, account.imap.port, account.imap.connect_timeout).await?
        }
        crate::Security::StartTls | crate::Security::None => {
            connect_plain(&account.imap.host, account.imap.port, account.imap.connect_timeout).await?
        }
    };

    let mut client: Client<ImapStream, mailsieve_imap::connection::NotAuthenticated> =
        Client::from_stream(stream).await?;
    client.set_command_timeout(account.imap.command_timeout);

    let client = if account.imap.security == crate::Security::StartTls {
        client.starttls(account.imap.effective_sni_host()).await?
    } else {
        client
    };

    let auth_client = match &account.imap.credential {
        Credential::Password(password) => client.login(&account.imap.username, password).await?,
        Credential::XOAuth2AccessToken(token) => client.authenticate_xoauth2(&account.email, token).await?,
        Credential::OAuthBearerAccessToken(token) => client.authenticate_oauthbearer(&account.email, token).await?,
    };

    Ok(auth_client)
}

async fn select_into(client: AuthClient, folder: &str) -> Result<PooledSession> {
    let (client, status): (SelectedClient, MailboxStatus) = client.select(folder).await?;
    Ok(PooledSession {
        client,
        folder: folder.to_string(),
        uid_validity: status.uid_validity.map_or(0, mailsieve_imap::types::UidValidity::get),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_empty() {
        let pool = ConnectionPool::new();
        assert!(pool.sessions.try_read().unwrap().is_empty());
    }
}
