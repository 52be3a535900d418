//! SASL initial-response encoding for IMAP AUTHENTICATE.
//!
//! The core only ever sees an already-resolved access token; acquiring
//! that token (device flow, refresh, provider discovery) is someone
//! else's problem. This module covers the wire mechanics of handing a
//! resolved token to the server: building the SASL initial-response
//! string and base64-encoding it per RFC 4959 / RFC 7628.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Builds the base64 initial response for the XOAUTH2 mechanism
/// (Google/Microsoft proprietary, predates OAUTHBEARER).
#[must_use]
pub fn xoauth2_response(user: &str, access_token: &str) -> String {
    let raw = format!("user={user}\x01auth=Bearer {access_token}\x01\x01");
    STANDARD.encode(raw)
}

/// Builds the base64 initial response for the OAUTHBEARER mechanism
/// (RFC 7628).
#[must_use]
pub fn oauthbearer_response(user: &str, access_token: &str) -> String {
    let raw = format!("n,a={user},\x01auth=Bearer {access_token}\x01\x01");
    STANDARD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xoauth2_roundtrips_through_base64() {
        let encoded = xoauth2_response("user@example.com", "tok123");
        let decoded = STANDARD.decode(encoded).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert_eq!(text, "user=user@example.com\x01auth=Bearer tok123\x01\x01");
    }

    #[test]
    fn oauthbearer_includes_gs2_header() {
        let encoded = oauthbearer_response("user@example.com", "tok123");
        let decoded = STANDARD.decode(encoded).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert!(text.starts_with("n,a=user@example.com,\x01"));
        assert!(text.contains("auth=Bearer tok123"));
    }
}
