//! Mail service for IMAP operations.
//!
//! Provides high-level email operations like fetching folders,
//! messages, and managing mail state.

use mailsieve_imap::command::{FetchAttribute, FetchItems, StoreAction};
use mailsieve_imap::connection::{Client, ImapStream, connect_plain, connect_tls};
use mailsieve_imap::parser::{Address, FetchItem};
use mailsieve_imap::types::{Flag, Flags, MailboxStatus, Uid, UidSet};

use crate::account::{Account, Credential};

/// Errors that can occur during mail operations.
#[derive(Debug, thiserror::Error)]
pub enum MailServiceError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Operation failed.
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// A folder in the mailbox.
#[derive(Debug, Clone)]
pub struct Folder {
    /// Folder name.
    pub name: String,
    /// Full path (including hierarchy).
    pub path: String,
    /// Whether the folder is selectable.
    pub selectable: bool,
    /// Whether this folder has children.
    pub has_children: bool,
    /// Folder attributes (inbox, sent, drafts, etc.).
    pub folder_type: FolderType,
    /// Number of unread messages (if known).
    pub unread_count: Option<u32>,
    /// Total message count (if known).
    pub total_count: Option<u32>,
}

/// Type of folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Drafts,
    /// Trash folder.
    Trash,
    /// Spam/junk folder.
    Spam,
    /// Archive folder.
    Archive,
    /// Regular folder.
    Regular,
}

impl FolderType {
    /// Detect folder type from name and attributes.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            Self::Inbox
        } else if lower.contains("sent") {
            Self::Sent
        } else if lower.contains("draft") {
            Self::Drafts
        } else if lower.contains("trash") || lower.contains("deleted") {
            Self::Trash
        } else if lower.contains("spam") || lower.contains("junk") {
            Self::Spam
        } else if lower.contains("archive") {
            Self::Archive
        } else {
            Self::Regular
        }
    }
}

/// Summary of an email message.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    /// Unique identifier.
    pub uid: Uid,
    /// Message subject.
    pub subject: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Date as string.
    pub date: String,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Whether the message is flagged.
    pub is_flagged: bool,
    /// Whether the message has attachments.
    pub has_attachment: bool,
    /// Preview snippet of the message body.
    pub snippet: String,
}

/// Type alias for authenticated IMAP client with TLS stream.
pub type AuthClient = Client<ImapStream, mailsieve_imap::connection::Authenticated>;

/// Type alias for selected IMAP client with TLS stream.
pub type SelectedClient = Client<ImapStream, mailsieve_imap::connection::Selected>;

/// Connect to an IMAP server and authenticate.
///
/// # Errors
///
/// Returns an error if connection or authentication fails.
pub async fn connect_and_login(account: &Account) -> Result<AuthClient, MailServiceError> {
    let stream = match account.imap.security {
        crate::Security::Tls => connect_tls(
            &account.imap.host,
            account.imap.port,
            account.imap.connect_timeout,
        )
        .await
        .map_err(|e| MailServiceError::Connection(e.to_string()))?,
        crate::Security::StartTls | crate::Security::None => connect_plain(
            &account.imap.host,
            account.imap.port,
            account.imap.connect_timeout,
        )
        .await
        .map_err(|e| MailServiceError::Connection(e.to_string()))?,
    };

    // Create client and read greeting
    let mut client: Client<ImapStream, mailsieve_imap::connection::NotAuthenticated> =
        Client::from_stream(stream)
            .await
            .map_err(|e| MailServiceError::Connection(e.to_string()))?;
    client.set_command_timeout(account.imap.command_timeout);

    // STARTTLS upgrade happens before authentication, plaintext stays as-is.
    let client = if account.imap.security == crate::Security::StartTls {
        client
            .starttls(account.imap.effective_sni_host())
            .await
            .map_err(|e| MailServiceError::Connection(e.to_string()))?
    } else {
        client
    };

    let auth_client = match &account.imap.credential {
        Credential::Password(password) => client
            .login(&account.imap.username, password)
            .await
            .map_err(|e| MailServiceError::Authentication(e.to_string()))?,
        Credential::XOAuth2AccessToken(token) => client
            .authenticate_xoauth2(&account.email, token)
            .await
            .map_err(|e| MailServiceError::Authentication(e.to_string()))?,
        Credential::OAuthBearerAccessToken(token) => client
            .authenticate_oauthbearer(&account.email, token)
            .await
            .map_err(|e| MailServiceError::Authentication(e.to_string()))?,
    };

    Ok(auth_client)
}

/// List all folders from an authenticated client.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub async fn list_folders(client: &mut AuthClient) -> Result<Vec<Folder>, MailServiceError> {
    let mailboxes = client
        .list("", "*")
        .await
        .map_err(|e| MailServiceError::Operation(e.to_string()))?;

    let folders = mailboxes
        .into_iter()
        .map(|mb| {
            let mailbox_name = mb.mailbox.as_str();
            let name = mailbox_name
                .rsplit_once('/')
                .map_or_else(|| mailbox_name.to_string(), |(_, n)| n.to_string());

            Folder {
                name,
                path: mailbox_name.to_string(),
                selectable: !mb
                    .attributes
                    .iter()
                    .any(|a| matches!(a, mailsieve_imap::types::MailboxAttribute::NoSelect)),
                has_children: mb
                    .attributes
                    .iter()
                    .any(|a| matches!(a, mailsieve_imap::types::MailboxAttribute::HasChildren)),
                folder_type: FolderType::from_name(mailbox_name),
                unread_count: None,
                total_count: None,
            }
        })
        .collect();

    Ok(folders)
}

/// Select a folder and return a selected client.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub async fn select_folder(
    client: AuthClient,
    folder_path: &str,
) -> Result<(SelectedClient, MailboxStatus), MailServiceError> {
    client
        .select(folder_path)
        .await
        .map_err(|e| MailServiceError::Operation(e.to_string()))
}

/// Fetch message summaries from the selected folder.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub async fn fetch_messages(
    client: &mut SelectedClient,
    uid_set: &UidSet,
) -> Result<Vec<MessageSummary>, MailServiceError> {
    // Fetch envelope, flags, and UID
    let fetch_items = FetchItems::Items(vec![
        FetchAttribute::Uid,
        FetchAttribute::Flags,
        FetchAttribute::Envelope,
        FetchAttribute::Body {
            section: Some("TEXT".to_string()),
            peek: true,
            partial: Some((0, 200)),
        },
    ]);

    let responses = client
        .uid_fetch(uid_set, fetch_items)
        .await
        .map_err(|e| MailServiceError::Operation(e.to_string()))?;

    let mut messages = Vec::new();
    for (_seq_num, items) in responses {
        let mut uid = None;
        let mut envelope = None;
        let mut flags = Flags::default();
        let mut body_text: Option<Vec<u8>> = None;

        // Extract items from the response
        for item in items {
            match item {
                FetchItem::Uid(u) => uid = Some(u),
                FetchItem::Envelope(e) => envelope = Some(e),
                FetchItem::Flags(f) => flags = f,
                FetchItem::Body { data, .. } => body_text = data,
                _ => {}
            }
        }

        if let Some(uid) = uid {
            let envelope = envelope.as_deref();

            messages.push(MessageSummary {
                uid,
                subject: envelope.and_then(|e| e.subject.clone()).unwrap_or_default(),
                from: envelope
                    .and_then(|e| e.from.first())
                    .map(format_address)
                    .unwrap_or_default(),
                to: envelope
                    .and_then(|e| e.to.first())
                    .map(format_address)
                    .unwrap_or_default(),
                date: envelope.and_then(|e| e.date.clone()).unwrap_or_default(),
                is_read: flags.contains(&Flag::Seen),
                is_flagged: flags.contains(&Flag::Flagged),
                has_attachment: false, // Would need BODYSTRUCTURE to detect
                snippet: body_text
                    .as_ref()
                    .map(|b| truncate_text(&String::from_utf8_lossy(b), 100))
                    .unwrap_or_default(),
            });
        }
    }

    Ok(messages)
}

/// Mark a message as read.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub async fn mark_read(client: &mut SelectedClient, uid: Uid) -> Result<(), MailServiceError> {
    add_flag(client, uid, Flag::Seen).await
}

/// Mark a message as unread.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub async fn mark_unread(client: &mut SelectedClient, uid: Uid) -> Result<(), MailServiceError> {
    remove_flag(client, uid, Flag::Seen).await
}

/// Toggle flagged status.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub async fn toggle_flag(
    client: &mut SelectedClient,
    uid: Uid,
    flagged: bool,
) -> Result<(), MailServiceError> {
    if flagged {
        add_flag(client, uid, Flag::Flagged).await
    } else {
        remove_flag(client, uid, Flag::Flagged).await
    }
}

/// Add a flag to a message.
async fn add_flag(
    client: &mut SelectedClient,
    uid: Uid,
    flag: Flag,
) -> Result<(), MailServiceError> {
    let uid_set = UidSet::single(uid);
    client
        .uid_store(&uid_set, StoreAction::AddFlags(vec![flag]))
        .await
        .map_err(|e| MailServiceError::Operation(e.to_string()))?;
    Ok(())
}

/// Remove a flag from a message.
async fn remove_flag(
    client: &mut SelectedClient,
    uid: Uid,
    flag: Flag,
) -> Result<(), MailServiceError> {
    let uid_set = UidSet::single(uid);
    client
        .uid_store(&uid_set, StoreAction::RemoveFlags(vec![flag]))
        .await
        .map_err(|e| MailServiceError::Operation(e.to_string()))?;
    Ok(())
}

/// Format an address for display, per spec.md §4.3: `"Name" <mbox@host>`
/// when all three are present, plain `mbox@host` otherwise.
pub(crate) fn format_address(addr: &Address) -> String {
    let has_name = addr.name.as_deref().is_some_and(|n| !n.is_empty());

    match (&addr.mailbox, &addr.host) {
        (Some(m), Some(h)) => {
            if has_name {
                format!("\"{}\" <{m}@{h}>", addr.name.as_deref().unwrap_or_default())
            } else {
                format!("{m}@{h}")
            }
        }
        (Some(m), None) => m.clone(),
        _ => addr.name.clone().unwrap_or_default(),
    }
}

/// Truncate text to a maximum length.
fn truncate_text(text: &str, max_len: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect();

    if text.chars().count() > max_len {
        format!("{cleaned}...")
    } else {
        cleaned
    }
}

/// Event received from IDLE monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// New messages in the mailbox.
    NewMail(u32),
    /// A message was expunged.
    Expunge,
    /// Flags changed on a message.
    FlagsChanged,
    /// Connection timed out (should restart IDLE).
    Timeout,
    /// Connection was lost.
    Disconnected(String),
}

/// Start IDLE monitoring on a folder.
///
/// This function connects to the IMAP server, selects the specified folder,
/// enters IDLE mode, waits for an event, and returns the event.
///
/// The caller should restart IDLE monitoring after handling the event.
///
/// # Errors
///
/// Returns an error if connection or IDLE fails.
pub async fn idle_monitor(
    account: &Account,
    folder_path: &str,
    timeout_secs: u64,
) -> Result<IdleEvent, MailServiceError> {
    use mailsieve_imap::IdleEvent as ImapIdleEvent;
    use std::time::Duration;

    // Connect and authenticate
    let auth_client = connect_and_login(account).await?;

    // Select the folder
    let (mut selected_client, _status) = select_folder(auth_client, folder_path).await?;

    // Enter IDLE mode
    let mut idle_handle = selected_client
        .idle()
        .await
        .map_err(|e| MailServiceError::Operation(format!("IDLE failed: {e}")))?;

    // Wait for an event
    let timeout_duration = Duration::from_secs(timeout_secs);
    let event = idle_handle
        .wait(timeout_duration)
        .await
        .map_err(|e| MailServiceError::Operation(format!("IDLE wait failed: {e}")))?;

    // Exit IDLE mode
    idle_handle
        .done()
        .await
        .map_err(|e| MailServiceError::Operation(format!("IDLE done failed: {e}")))?;

    // Convert to our event type
    Ok(match event {
        ImapIdleEvent::Exists(count) => IdleEvent::NewMail(count),
        ImapIdleEvent::Expunge(_) => IdleEvent::Expunge,
        ImapIdleEvent::Fetch { .. } => IdleEvent::FlagsChanged,
        ImapIdleEvent::Recent(_) => IdleEvent::NewMail(0),
        ImapIdleEvent::Timeout => IdleEvent::Timeout,
    })
}

#[cfg(test)]
mod format_address_tests {
    use super::*;

    fn addr(name: Option<&str>, mailbox: Option<&str>, host: Option<&str>) -> Address {
        Address {
            name: name.map(String::from),
            adl: None,
            mailbox: mailbox.map(String::from),
            host: host.map(String::from),
        }
    }

    #[test]
    fn full_address_quotes_name_around_mbox_host() {
        let a = addr(Some("Jane Doe"), Some("jane"), Some("example.com"));
        assert_eq!(format_address(&a), "\"Jane Doe\" <jane@example.com>");
    }

    #[test]
    fn no_name_falls_back_to_plain_mbox_host() {
        let a = addr(None, Some("jane"), Some("example.com"));
        assert_eq!(format_address(&a), "jane@example.com");
    }

    #[test]
    fn empty_name_treated_as_absent() {
        let a = addr(Some(""), Some("jane"), Some("example.com"));
        assert_eq!(format_address(&a), "jane@example.com");
    }

    #[test]
    fn mailbox_without_host_falls_back_to_mailbox() {
        let a = addr(Some("Jane"), Some("jane"), None);
        assert_eq!(format_address(&a), "jane");
    }
}
