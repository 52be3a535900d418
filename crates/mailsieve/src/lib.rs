//! # mailsieve
//!
//! Core business logic for `Mailsieve` email client.
//!
//! This crate provides:
//! - Account management
//! - Message synchronization
//! - Local storage (`SQLite`)
//! - Domain models
//! - Email services

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod error;
pub mod orchestrator;
pub mod pool;
pub mod render;
pub mod service;
pub mod store;

pub use account::credentials;
pub use account::{Account, AccountId, AccountRepository, Credential, ImapConfig, Security};
pub use account::{ValidationError, ValidationResult, validate_account};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, PoolGuard};
pub use service::{
    AuthClient, Folder, FolderType, IdleEvent, MailServiceError, MessageSummary, SelectedClient,
    connect_and_login, fetch_messages, idle_monitor, list_folders, mark_read, mark_unread,
    select_folder, toggle_flag,
};
