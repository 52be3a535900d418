//! Account model types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::credentials::Credential;

/// Default bound on the TCP-connect-plus-TLS-handshake phase of `open`.
const fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Default bound on a single IMAP command round-trip.
const fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Default bound on an IDLE wait before a fresh DONE/IDLE cycle.
const fn default_idle_timeout() -> Duration {
    Duration::from_secs(29 * 60)
}

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// IMAP server configuration.
///
/// Mirrors the "Account credentials" input described for the sync
/// pipeline: host, port, TLS mode, SNI override, username and an
/// already-resolved [`Credential`]. Acquiring that credential (keychain,
/// OAuth device flow, config file) happens before this struct exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 993 for TLS, 143 for STARTTLS).
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// SNI hostname to present during the TLS handshake, if it differs
    /// from `host` (e.g. connecting through a proxy).
    pub sni_host: Option<String>,
    /// Username for authentication.
    pub username: String,
    /// Already-resolved credential used to authenticate.
    pub credential: Credential,
    /// Bound on TCP connect plus TLS handshake (spec.md §4.1 `open`,
    /// §6 "connect_timeout").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Bound on a single IMAP command round-trip, i.e. time from sending
    /// a tagged command to receiving its tagged completion (spec.md §6
    /// "command_timeout").
    #[serde(default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// Bound on a single IDLE wait before issuing DONE and re-IDLEing
    /// (spec.md §6 "idle_timeout"). Servers generally require a refresh
    /// before 30 minutes; per-server quirks may shorten this further.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: Duration,
}

impl ImapConfig {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None | Security::StartTls => 143,
            Security::Tls => 993,
        }
    }

    /// Hostname to present during the TLS handshake: `sni_host` if set,
    /// otherwise `host`.
    #[must_use]
    pub fn effective_sni_host(&self) -> &str {
        self.sni_host.as_deref().unwrap_or(&self.host)
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            security: Security::default(),
            sni_host: None,
            username: String::new(),
            credential: Credential::Password(String::new()),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Email account configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Display name for the account.
    pub name: String,
    /// Email address.
    pub email: String,
    /// IMAP configuration.
    pub imap: ImapConfig,
    /// Whether this is the default account.
    pub is_default: bool,
}

impl Account {
    /// Create a new empty account.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create account with common defaults for well-known providers.
    #[must_use]
    pub fn with_email(email: &str) -> Self {
        let mut account = Self {
            email: email.to_string(),
            ..Default::default()
        };

        // Auto-detect provider settings
        if let Some(domain) = email.split('@').nth(1) {
            match domain.to_lowercase().as_str() {
                "gmail.com" | "googlemail.com" => {
                    account.name = "Gmail".to_string();
                    account.imap.host = "imap.gmail.com".to_string();
                    account.imap.port = 993;
                    account.imap.security = Security::Tls;
                }
                "outlook.com" | "hotmail.com" | "live.com" => {
                    account.name = "Outlook".to_string();
                    account.imap.host = "outlook.office365.com".to_string();
                    account.imap.port = 993;
                    account.imap.security = Security::Tls;
                }
                "yahoo.com" | "ymail.com" => {
                    account.name = "Yahoo".to_string();
                    account.imap.host = "imap.mail.yahoo.com".to_string();
                    account.imap.port = 993;
                    account.imap.security = Security::Tls;
                }
                "icloud.com" | "me.com" | "mac.com" => {
                    account.name = "iCloud".to_string();
                    account.imap.host = "imap.mail.me.com".to_string();
                    account.imap.port = 993;
                    account.imap.security = Security::Tls;
                }
                _ => {
                    // Use domain as account name
                    account.name = domain.to_string();
                }
            }
        }

        // Set username to email by default
        account.imap.username = email.to_string();

        account
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    mod account_id_tests {
        use super::*;

        #[test]
        fn new() {
            let id = AccountId::new(42);
            assert_eq!(id.0, 42);
        }

        #[test]
        fn display() {
            let id = AccountId::new(123);
            assert_eq!(format!("{id}"), "123");
        }

        #[test]
        fn equality() {
            let id1 = AccountId::new(1);
            let id2 = AccountId::new(1);
            let id3 = AccountId::new(2);
            assert_eq!(id1, id2);
            assert_ne!(id1, id3);
        }
    }

    mod security_tests {
        use super::*;

        #[test]
        fn default_is_tls() {
            assert_eq!(Security::default(), Security::Tls);
        }

        #[test]
        fn display_names() {
            assert_eq!(Security::None.display_name(), "None (insecure)");
            assert_eq!(Security::Tls.display_name(), "SSL/TLS");
            assert_eq!(Security::StartTls.display_name(), "STARTTLS");
        }
    }

    mod imap_config_tests {
        use super::*;

        #[test]
        fn default_port_tls() {
            assert_eq!(ImapConfig::default_port(Security::Tls), 993);
        }

        #[test]
        fn default_port_starttls() {
            assert_eq!(ImapConfig::default_port(Security::StartTls), 143);
        }

        #[test]
        fn default_port_none() {
            assert_eq!(ImapConfig::default_port(Security::None), 143);
        }

        #[test]
        fn default() {
            let config = ImapConfig::default();
            assert!(config.host.is_empty());
            assert_eq!(config.port, 0);
            assert_eq!(config.security, Security::Tls);
        }

        #[test]
        fn default_timeouts() {
            let config = ImapConfig::default();
            assert_eq!(config.connect_timeout, Duration::from_secs(30));
            assert_eq!(config.command_timeout, Duration::from_secs(60));
            assert_eq!(config.idle_timeout, Duration::from_secs(29 * 60));
        }

        #[test]
        fn effective_sni_host_falls_back_to_host() {
            let mut config = ImapConfig {
                host: "imap.example.com".to_string(),
                ..Default::default()
            };
            assert_eq!(config.effective_sni_host(), "imap.example.com");
            config.sni_host = Some("sni.proxy.example.com".to_string());
            assert_eq!(config.effective_sni_host(), "sni.proxy.example.com");
        }
    }

    mod account_tests {
        use super::*;

        #[test]
        fn new_creates_empty() {
            let account = Account::new();
            assert!(account.id.is_none());
            assert!(account.name.is_empty());
            assert!(account.email.is_empty());
            assert!(!account.is_default);
        }

        #[test]
        fn with_email_gmail() {
            let account = Account::with_email("user@gmail.com");
            assert_eq!(account.name, "Gmail");
            assert_eq!(account.email, "user@gmail.com");
            assert_eq!(account.imap.host, "imap.gmail.com");
            assert_eq!(account.imap.port, 993);
            assert_eq!(account.imap.security, Security::Tls);
            assert_eq!(account.imap.username, "user@gmail.com");
        }

        #[test]
        fn with_email_googlemail() {
            let account = Account::with_email("user@googlemail.com");
            assert_eq!(account.name, "Gmail");
            assert_eq!(account.imap.host, "imap.gmail.com");
        }

        #[test]
        fn with_email_outlook() {
            let account = Account::with_email("user@outlook.com");
            assert_eq!(account.name, "Outlook");
            assert_eq!(account.imap.host, "outlook.office365.com");
        }

        #[test]
        fn with_email_hotmail() {
            let account = Account::with_email("user@hotmail.com");
            assert_eq!(account.name, "Outlook");
        }

        #[test]
        fn with_email_live() {
            let account = Account::with_email("user@live.com");
            assert_eq!(account.name, "Outlook");
        }

        #[test]
        fn with_email_yahoo() {
            let account = Account::with_email("user@yahoo.com");
            assert_eq!(account.name, "Yahoo");
            assert_eq!(account.imap.host, "imap.mail.yahoo.com");
        }

        #[test]
        fn with_email_ymail() {
            let account = Account::with_email("user@ymail.com");
            assert_eq!(account.name, "Yahoo");
        }

        #[test]
        fn with_email_icloud() {
            let account = Account::with_email("user@icloud.com");
            assert_eq!(account.name, "iCloud");
            assert_eq!(account.imap.host, "imap.mail.me.com");
        }

        #[test]
        fn with_email_me_com() {
            let account = Account::with_email("user@me.com");
            assert_eq!(account.name, "iCloud");
        }

        #[test]
        fn with_email_mac_com() {
            let account = Account::with_email("user@mac.com");
            assert_eq!(account.name, "iCloud");
        }

        #[test]
        fn with_email_unknown_domain() {
            let account = Account::with_email("user@example.org");
            assert_eq!(account.name, "example.org");
            // Host should not be auto-filled for unknown domains
            assert!(account.imap.host.is_empty());
        }

        #[test]
        fn with_email_sets_username() {
            let account = Account::with_email("test@example.com");
            assert_eq!(account.imap.username, "test@example.com");
        }
    }
}
