//! IMAP command builder.
//!
//! Only the commands a synchronizing client issues are modelled.

mod serialize;
mod tag_generator;

use crate::types::UidSet;

pub use tag_generator::TagGenerator;

use serialize::{write_astring, write_fetch_attributes, write_search_criteria};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: String,
    },
    /// UID SEARCH command.
    UidSearch {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// UID FETCH command.
    UidFetch {
        /// UIDs to fetch.
        uids: UidSet,
        /// Attributes to return for each message.
        attributes: Vec<FetchAttribute>,
    },
}

/// SEARCH criteria understood by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message in the mailbox.
    All,
    /// Messages whose UID is in the set.
    Uid(UidSet),
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAttribute {
    /// The message UID.
    Uid,
    /// Message flags.
    Flags,
    /// Internal (arrival) date.
    InternalDate,
    /// RFC822 size in octets.
    Rfc822Size,
    /// Entire message without setting `\Seen`.
    BodyPeek,
}

impl FetchAttribute {
    /// Returns the wire form of the attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "UID",
            Self::Flags => "FLAGS",
            Self::InternalDate => "INTERNALDATE",
            Self::Rfc822Size => "RFC822.SIZE",
            Self::BodyPeek => "BODY.PEEK[]",
        }
    }
}

impl Command {
    /// Serializes the command with the given tag, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox);
            }
            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }
            Self::UidFetch { uids, attributes } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_attributes(&mut buf, attributes);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns a loggable name for the command that never includes credentials.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Examine { .. } => "EXAMINE",
            Self::UidSearch { .. } => "UID SEARCH",
            Self::UidFetch { .. } => "UID FETCH",
        }
    }
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
    use crate::types::Uid;

    fn wire(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize("A0001")).unwrap()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(wire(&Command::Capability), "A0001 CAPABILITY\r\n");
        assert_eq!(wire(&Command::Logout), "A0001 LOGOUT\r\n");
        assert_eq!(wire(&Command::StartTls), "A0001 STARTTLS\r\n");
    }

    #[test]
    fn test_login_quotes_password() {
        let cmd = Command::Login {
            username: "alice@example.com".to_string(),
            password: "p@ss word".to_string(),
        };
        assert_eq!(wire(&cmd), "A0001 LOGIN alice@example.com \"p@ss word\"\r\n");
        assert_eq!(cmd.name(), "LOGIN");
    }

    #[test]
    fn test_examine_inbox() {
        let cmd = Command::Examine {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(wire(&cmd), "A0001 EXAMINE INBOX\r\n");
    }

    #[test]
    fn test_uid_search() {
        let cmd = Command::UidSearch {
            criteria: SearchCriteria::All,
        };
        assert_eq!(wire(&cmd), "A0001 UID SEARCH ALL\r\n");

        let set = UidSet::from_uids([Uid::new(5).unwrap(), Uid::new(6).unwrap()]);
        let cmd = Command::UidSearch {
            criteria: SearchCriteria::Uid(set),
        };
        assert_eq!(wire(&cmd), "A0001 UID SEARCH UID 5:6\r\n");
    }

    #[test]
    fn test_uid_fetch_summary_and_body() {
        let uids = UidSet::from_uids([1, 2, 3, 10].into_iter().filter_map(Uid::new));
        let cmd = Command::UidFetch {
            uids,
            attributes: vec![
                FetchAttribute::Uid,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
                FetchAttribute::Flags,
            ],
        };
        assert_eq!(
            wire(&cmd),
            "A0001 UID FETCH 1:3,10 (UID INTERNALDATE RFC822.SIZE FLAGS)\r\n"
        );

        let cmd = Command::UidFetch {
            uids: UidSet::single(Uid::new(4).unwrap()),
            attributes: vec![FetchAttribute::Uid, FetchAttribute::BodyPeek],
        };
        assert_eq!(wire(&cmd), "A0001 UID FETCH 4 (UID BODY.PEEK[])\r\n");
    }
}
