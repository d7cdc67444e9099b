//! Account management module.
//!
//! Provides account storage, validation and credential protection.

pub mod master_key;
mod model;
mod repository;
mod validation;
mod vault;

pub use model::{Account, AccountId, AccountUpdate, Endpoint, NewAccount, Security};
pub(crate) use repository::parse_timestamp;
pub use repository::AccountRepository;
pub use validation::{ValidationError, ValidationResult, validate_account};
pub use vault::{Vault, VaultError};
