//! Error types for the core library.

use thiserror::Error;

use crate::account::{AccountId, ValidationError};
use crate::sync::SourceError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Master key storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] keyring::Error),

    /// Account fields failed validation.
    #[error("Invalid account: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    /// Remote mail source failed.
    #[error("Mail source error: {0}")]
    Source(#[from] SourceError),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::message)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
