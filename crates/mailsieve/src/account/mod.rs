//! Account management module.
//!
//! Provides account configuration, storage, and validation.

pub mod credentials;
mod model;
mod repository;
mod validation;

pub use credentials::Credential;
pub use model::{Account, AccountId, ImapConfig, Security};
pub use repository::AccountRepository;
pub use validation::{ValidationError, ValidationResult, validate_account};
