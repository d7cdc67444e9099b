//! Remote message source abstraction.
//!
//! A [`MailConnector`] opens one [`MailSession`] per sync pass. Listing and
//! fetching are separate steps so the window can be chosen from cheap
//! identifiers before any message body is transferred.

use std::future::Future;

use chrono::{DateTime, FixedOffset};
use mailsync_imap::Uid;
use thiserror::Error;

use crate::account::Endpoint;

/// Failure talking to the remote mailbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Connection, TLS or timeout failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server refused or garbled a command.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The message was expunged after the folder was listed.
    #[error("Message {0} is no longer available")]
    Gone(u32),
}

impl From<mailsync_imap::Error> for SourceError {
    fn from(err: mailsync_imap::Error) -> Self {
        match err {
            mailsync_imap::Error::Auth(text) => Self::Auth(text),
            e if e.is_transport() => Self::Transport(e.to_string()),
            e => Self::Protocol(e.to_string()),
        }
    }
}

/// Identifiers of every message in the synced folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    /// UIDVALIDITY of the folder, when the server reports one.
    pub uid_validity: Option<u32>,
    /// Every UID in the folder, ascending.
    pub ids: Vec<Uid>,
}

/// Summary metadata of one listed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessageRef {
    /// UID as reported by the server. Zero marks an invalid entry.
    pub raw_uid: u32,
    /// INTERNALDATE, when returned.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// Size in bytes, when returned.
    pub size: Option<u32>,
    /// Whether the server has the message flagged `\Seen`.
    pub seen: bool,
}

impl RemoteMessageRef {
    /// The validated UID, or `None` for the invalid sentinel.
    #[must_use]
    pub fn uid(&self) -> Option<Uid> {
        Uid::new(self.raw_uid)
    }
}

/// Full bytes of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// UID the message was fetched by.
    pub uid: Uid,
    /// RFC 5322 message bytes.
    pub bytes: Vec<u8>,
}

/// Opens sessions against a mail server.
pub trait MailConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Establishes the transport connection.
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Session, SourceError>> + Send;
}

/// One connected session with a mail server.
pub trait MailSession: Send {
    /// Logs in.
    fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Opens the inbox read-only and lists every UID in it.
    fn list_all(&mut self) -> impl Future<Output = Result<FolderListing, SourceError>> + Send;

    /// Fetches summary metadata for exactly the given UIDs.
    fn fetch_summaries(
        &mut self,
        ids: &[Uid],
    ) -> impl Future<Output = Result<Vec<RemoteMessageRef>, SourceError>> + Send;

    /// Fetches the full bytes of one message.
    ///
    /// A message expunged since listing is [`SourceError::Gone`].
    fn fetch_full_message(
        &mut self,
        id: Uid,
    ) -> impl Future<Output = Result<RawMessage, SourceError>> + Send;

    /// Closes the session. Never fails.
    fn disconnect(self) -> impl Future<Output = ()> + Send;
}
