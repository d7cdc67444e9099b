//! Stored message model types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Local row identifier of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message persisted by a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Local row identifier.
    pub id: MessageId,
    /// Owning account.
    pub account_id: AccountId,
    /// `Message-ID` of the message, or a generated UUID.
    pub message_id: String,
    /// True when `message_id` was generated locally.
    pub synthetic_id: bool,
    /// Sender.
    pub from: String,
    /// Recipients.
    pub to: String,
    /// Subject.
    pub subject: String,
    /// Extracted plain text.
    pub content: String,
    /// Preview of `content`.
    pub snippet: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Local read flag.
    pub is_read: bool,
    /// Whether the message has attachments.
    pub has_attachments: bool,
    /// When the record was stored.
    pub created_at: DateTime<Utc>,
}

/// A normalized message not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// `Message-ID` of the message, or a generated UUID.
    pub message_id: String,
    /// True when `message_id` was generated locally.
    pub synthetic_id: bool,
    /// Sender.
    pub from: String,
    /// Recipients.
    pub to: String,
    /// Subject.
    pub subject: String,
    /// Extracted plain text.
    pub content: String,
    /// Preview of `content`.
    pub snippet: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Local read flag; always false for freshly synced mail.
    pub is_read: bool,
    /// Whether the message has attachments.
    pub has_attachments: bool,
}

impl NewMessage {
    /// The fallback identity used when message ids are unstable.
    #[must_use]
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey {
            from: self.from.clone(),
            subject: self.subject.clone(),
            received_at: self.received_at,
        }
    }
}

/// Sender, subject and received time of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    /// Sender.
    pub from: String,
    /// Subject.
    pub subject: String,
    /// Received timestamp.
    pub received_at: DateTime<Utc>,
}

/// Read-state filter for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFilter {
    /// Every message.
    #[default]
    All,
    /// Only read messages.
    Read,
    /// Only unread messages.
    Unread,
}

impl ReadFilter {
    pub(crate) const fn as_flag(self) -> Option<bool> {
        match self {
            Self::All => None,
            Self::Read => Some(true),
            Self::Unread => Some(false),
        }
    }
}

impl std::str::FromStr for ReadFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "read" => Ok(Self::Read),
            "unread" => Ok(Self::Unread),
            other => Err(format!("unknown filter: {other}")),
        }
    }
}

/// A page request for stored messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
    /// Restrict to one account.
    pub account_id: Option<AccountId>,
    /// 1-based page number.
    pub page: u32,
    /// Messages per page.
    pub page_size: u32,
    /// Read-state filter.
    pub filter: ReadFilter,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            account_id: None,
            page: 1,
            page_size: 20,
            filter: ReadFilter::All,
        }
    }
}

impl MessageQuery {
    /// Row offset of the requested page. Page 0 is read as page 1.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }
}

/// Where the last sync pass of an account stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    /// UIDVALIDITY of the folder when the cursor was written.
    pub uid_validity: u32,
    /// Highest UID attempted.
    pub last_uid: u32,
}

/// Formats a received timestamp the way it is stored and compared.
pub(crate) fn format_received(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
