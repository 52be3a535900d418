//! Core services for email operations.
//!
//! This module provides the service layer that bridges callers with the
//! underlying IMAP transport and MIME rendering pipeline.

pub mod mail;

pub use mail::{
    AuthClient, Folder, FolderType, IdleEvent, MailServiceError, MessageSummary, SelectedClient,
    connect_and_login, fetch_messages, idle_monitor, list_folders, mark_read, mark_unread,
    select_folder, toggle_flag,
};
