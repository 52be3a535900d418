//! Stream types for IMAP connections.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// Default connect timeout for [`connect_tls`]/[`connect_plain`] when a
/// caller doesn't have an account-level override handy (spec.md §4.1
/// `open(config)`'s `connect-timeout`).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Creates a new plaintext stream.
    pub const fn plain(stream: TcpStream) -> Self {
        Self::Plain(stream)
    }

    /// Creates a new TLS stream.
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(Box::new(stream))
    }

    /// Upgrades a plaintext stream to TLS using STARTTLS.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector()?;
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| Error::TlsHandshake { host: host.to_string(), source: e })?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with default root certificates.
pub fn create_tls_connector() -> Result<TlsConnector> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Classifies a TCP connect failure into the distinct `Error` variants
/// spec.md §7's error taxonomy names, rather than a generic `Error::Io`.
fn classify_connect_error(err: io::Error, addr: &str) -> Error {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => Error::ConnectRefused(addr.to_string()),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
            Error::NetworkUnreachable(addr.to_string())
        }
        _ => Error::Io(err),
    }
}

/// Connects to a server with TLS from the start, bounding the whole
/// TCP-connect-plus-handshake by `connect_timeout` (spec.md §4.1).
pub async fn connect_tls(host: &str, port: u16, connect_timeout: Duration) -> Result<ImapStream> {
    let addr = format!("{host}:{port}");

    tokio::time::timeout(connect_timeout, async {
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| classify_connect_error(e, &addr))?;

        let connector = create_tls_connector()?;
        let server_name = ServerName::try_from(host.to_string())?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::TlsHandshake { host: host.to_string(), source: e })?;

        Ok(ImapStream::Tls(Box::new(tls)))
    })
    .await
    .map_err(|_| Error::ConnectTimeout(connect_timeout))?
}

/// Connects to a server without TLS (for STARTTLS or testing), bounded by
/// `connect_timeout`.
pub async fn connect_plain(host: &str, port: u16, connect_timeout: Duration) -> Result<ImapStream> {
    let addr = format!("{host}:{port}");
    let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::ConnectTimeout(connect_timeout))?
        .map_err(|e| classify_connect_error(e, &addr))?;
    Ok(ImapStream::Plain(tcp))
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

    #[test]
    fn test_create_tls_connector() {
        let connector = create_tls_connector();
        assert!(connector.is_ok());
    }

    #[test]
    fn classifies_connection_refused() {
        let err = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(classify_connect_error(err, "host:143"), Error::ConnectRefused(_)));
    }

    #[test]
    fn classifies_network_unreachable() {
        let err = io::Error::from(io::ErrorKind::NetworkUnreachable);
        assert!(matches!(classify_connect_error(err, "host:143"), Error::NetworkUnreachable(_)));
    }

    #[test]
    fn passes_through_other_io_errors() {
        let err = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(matches!(classify_connect_error(err, "host:143"), Error::Io(_)));
    }

    // Relies on outbound connects to a TEST-NET-1 address (RFC 5737) hanging
    // rather than refusing, which isn't guaranteed on every network; run
    // explicitly rather than as part of the default suite.
    #[ignore]
    #[tokio::test]
    async fn test_connect_plain_times_out() {
        let result = connect_plain("192.0.2.1", 143, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::ConnectTimeout(_))));
    }
}
