//! # mailsync-core
//!
//! Mailbox synchronization for `mailsync`.
//!
//! This crate provides:
//! - Account storage with vault-protected passwords
//! - Message storage (`SQLite`)
//! - The sync engine: window selection, normalization, dedup, checkpoints
//! - An IMAP-backed mail source
//! - Configuration loading

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
mod error;
pub mod message;
pub mod service;
pub mod store;
pub mod sync;

pub use account::{
    Account, AccountId, AccountRepository, AccountUpdate, Endpoint, NewAccount, Security,
    ValidationError, ValidationResult, Vault, validate_account,
};
pub use config::Config;
pub use error::{Error, Result};
pub use message::{
    MessageId, MessageQuery, MessageRepository, NewMessage, ReadFilter, StoredMessage, SyncCursor,
};
pub use service::MailService;
pub use store::{Database, MailStore, SqliteStore};
pub use sync::{
    ChannelProgress, ImapConnector, Progress, ProgressSink, SourceError, SyncEngine, SyncMode,
    SyncPhase, SyncReport, WindowConfig,
};
