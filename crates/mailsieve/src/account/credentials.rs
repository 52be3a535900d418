//! Resolved account credentials.
//!
//! The core never acquires, stores, or refreshes secrets: by the time a
//! [`Credential`] reaches [`crate::service`], whatever arranged for it —
//! a keychain lookup, an OAuth device flow, a config file — has already
//! run. This module only describes the shape of a resolved credential
//! so the transport layer knows which IMAP authentication path to take.

use serde::{Deserialize, Serialize};

/// An already-resolved credential for authenticating to an IMAP server.
///
/// Construct one from wherever secrets live in the embedding
/// application and pass it to [`crate::service::connect_and_login`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Credential {
    /// Plain username/password, sent via IMAP LOGIN.
    Password(String),
    /// A bearer access token, sent via the XOAUTH2 SASL mechanism.
    XOAuth2AccessToken(String),
    /// A bearer access token, sent via the OAUTHBEARER SASL mechanism (RFC 7628).
    OAuthBearerAccessToken(String),
}

impl Credential {
    /// Returns `true` if this credential authenticates via a SASL bearer
    /// mechanism rather than plain LOGIN.
    #[must_use]
    pub const fn is_oauth(&self) -> bool {
        matches!(
            self,
            Self::XOAuth2AccessToken(_) | Self::OAuthBearerAccessToken(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn password_is_not_oauth() {
        assert!(!Credential::Password("hunter2".into()).is_oauth());
    }

    #[test]
    fn bearer_variants_are_oauth() {
        assert!(Credential::XOAuth2AccessToken("tok".into()).is_oauth());
        assert!(Credential::OAuthBearerAccessToken("tok".into()).is_oauth());
    }

    #[test]
    fn serializes_round_trip() {
        let cred = Credential::OAuthBearerAccessToken("tok123".into());
        let json = serde_json::to_string(&cred).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert!(back.is_oauth());
    }
}
