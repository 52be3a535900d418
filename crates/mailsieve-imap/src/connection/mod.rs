//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - TLS/plaintext stream abstraction
//! - Framed I/O for IMAP protocol
//! - Type-state connection wrapper
//! - IDLE support for real-time notifications

mod client;
mod framed;
mod idle;
pub(crate) mod sasl;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use framed::{FramedStream, ResponseAccumulator};
pub use idle::{IdleEvent, IdleHandle};
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};
