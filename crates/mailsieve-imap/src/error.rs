//! Error types for the IMAP library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Protocol parsing error.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The initial TCP connect (or STARTTLS/TLS handshake riding on it)
    /// did not complete within `connect_timeout` (spec.md §4.1 `open`,
    /// §7's error taxonomy names this as distinct from a generic I/O
    /// failure or a post-connect command timeout).
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The peer actively refused the TCP connection (`io::ErrorKind::ConnectionRefused`),
    /// e.g. nothing listening on the configured port (spec.md §7's error
    /// taxonomy distinguishes this from a timeout or an unreachable network).
    #[error("Connection refused connecting to {0}")]
    ConnectRefused(String),

    /// The network itself was unreachable (`io::ErrorKind::NetworkUnreachable`/
    /// `HostUnreachable`), e.g. no route to the host (spec.md §7).
    #[error("Network unreachable connecting to {0}")]
    NetworkUnreachable(String),

    /// The TLS handshake itself failed, as distinct from the TCP connect
    /// that preceded it (spec.md §7's error taxonomy names this separately
    /// from a generic `Tls` error so callers can tell "reached the server,
    /// but TLS negotiation failed" apart from other TLS-shaped errors).
    #[error("TLS handshake with {host} failed: {source}")]
    TlsHandshake {
        /// Host the handshake was attempted against.
        host: String,
        /// The underlying I/O error from the handshake (rustls surfaces
        /// handshake failures as `io::Error`, not `rustls::Error`).
        source: std::io::Error,
    },

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The server's first response after connecting was neither `* OK`
    /// nor `* PREAUTH` (spec.md §4.1 `open`: "must start with `* OK` or
    /// `* PREAUTH`").
    #[error("Bad greeting: {0}")]
    BadGreeting(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
