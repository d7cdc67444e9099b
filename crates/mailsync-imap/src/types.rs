//! Core IMAP types.
//!
//! Identifiers, response status, capabilities, response codes and the
//! mailbox snapshot returned by EXAMINE.

#![allow(clippy::missing_const_for_fn)]

use std::fmt;
use std::num::NonZeroU32;

/// IMAP command tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message sequence number (1-based, ephemeral).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a new sequence number. Returns `None` for 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Unique identifier of a message within a mailbox.
///
/// Combined with [`UidValidity`], a UID names a message across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a new UID. Returns `None` for 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UIDVALIDITY value for a mailbox.
///
/// If this value changes, all cached UIDs are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a new UIDVALIDITY. Returns `None` for 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// A set of UIDs, serialized as comma-separated ranges (`1:3,7,9:10`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidSet {
    ranges: Vec<(u32, u32)>,
}

impl UidSet {
    /// Builds a set from arbitrary UIDs, sorting and collapsing runs.
    #[must_use]
    pub fn from_uids(uids: impl IntoIterator<Item = Uid>) -> Self {
        let mut values: Vec<u32> = uids.into_iter().map(Uid::get).collect();
        values.sort_unstable();
        values.dedup();

        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for value in values {
            match ranges.last_mut() {
                Some((_, end)) if end.checked_add(1) == Some(value) => *end = value,
                _ => ranges.push((value, value)),
            }
        }
        Self { ranges }
    }

    /// Creates a set holding a single UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self {
            ranges: vec![(uid.get(), uid.get())],
        }
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the number of UIDs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|(start, end)| (end - start) as usize + 1)
            .sum()
    }
}

impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}:{end}")?;
            }
        }
        Ok(())
    }
}

/// Response status from a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled until TLS is negotiated
    LoginDisabled,
    /// IDLE command support (RFC 2177)
    Idle,
    /// AUTH mechanism
    Auth(String),
    /// Anything this client does not act on
    Unknown(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "IDLE" => Self::Idle,
            _ => upper.strip_prefix("AUTH=").map_or_else(
                || Self::Unknown(s.to_string()),
                |mechanism| Self::Auth(mechanism.to_string()),
            ),
        }
    }
}

/// Response code carried in `[...]` after a status keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: message that must be shown to the user.
    Alert,
    /// CAPABILITY list sent with the greeting or after LOGIN.
    Capability(Vec<Capability>),
    /// READ-ONLY: mailbox opened read-only.
    ReadOnly,
    /// READ-WRITE: mailbox opened read-write.
    ReadWrite,
    /// UIDNEXT: next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY of the selected mailbox.
    UidValidity(UidValidity),
    /// AUTHENTICATIONFAILED (RFC 5530).
    AuthenticationFailed,
    /// Any other code, by name.
    Unknown(String),
}

/// Mailbox snapshot from an EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Whether the mailbox is read-only.
    pub read_only: bool,
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

    fn uids(values: &[u32]) -> Vec<Uid> {
        values.iter().filter_map(|&v| Uid::new(v)).collect()
    }

    #[test]
    fn test_uid_rejects_zero() {
        assert!(Uid::new(0).is_none());
        assert_eq!(Uid::new(7).unwrap().get(), 7);
        assert!(UidValidity::new(0).is_none());
        assert!(SeqNum::new(0).is_none());
    }

    #[test]
    fn test_uid_set_collapses_runs() {
        let set = UidSet::from_uids(uids(&[9, 1, 2, 3, 7, 10, 2]));
        assert_eq!(set.to_string(), "1:3,7,9:10");
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn test_uid_set_single_and_empty() {
        assert_eq!(UidSet::single(Uid::new(42).unwrap()).to_string(), "42");
        let empty = UidSet::from_uids(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.to_string(), "");
    }

    #[test]
    fn test_uid_set_max_value() {
        let set = UidSet::from_uids(uids(&[u32::MAX - 1, u32::MAX]));
        assert_eq!(set.to_string(), format!("{}:{}", u32::MAX - 1, u32::MAX));
    }

    #[test]
    fn test_capability_parse() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("starttls"), Capability::StartTls);
        assert_eq!(Capability::parse("LOGINDISABLED"), Capability::LoginDisabled);
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("X-GM-EXT-1"),
            Capability::Unknown("X-GM-EXT-1".to_string())
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_uid_set_len_counts_distinct(values in proptest::collection::vec(1u32..500, 0..200)) {
            let set = UidSet::from_uids(uids(&values));
            let mut distinct = values.clone();
            distinct.sort_unstable();
            distinct.dedup();
            proptest::prop_assert_eq!(set.len(), distinct.len());
            proptest::prop_assert_eq!(set.is_empty(), distinct.is_empty());
        }
    }

    #[test]
    fn test_status_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(Status::PreAuth.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Bye.is_ok());
    }
}
