//! # mailsync-imap
//!
//! A small IMAP4rev1/IMAP4rev2 client covering the commands a one-folder
//! mailbox synchronizer needs: greeting, CAPABILITY, STARTTLS, LOGIN,
//! EXAMINE, UID SEARCH, UID FETCH and LOGOUT.
//!
//! ## Connection States
//!
//! Valid command sequences are enforced with the type-state pattern:
//!
//! ```text
//! NotAuthenticated ─── login() ───→ Authenticated ─── examine() ───→ Selected
//! ```
//!
//! A refused `login()` or `examine()` hands the connection back in its old
//! state inside [`Refused`], so it can still be logged out.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_imap::{Client, Config, FetchAttribute, SearchCriteria, Security};
//!
//! #[tokio::main]
//! async fn main() -> mailsync_imap::Result<()> {
//!     let config = Config::new("imap.example.com", Security::Implicit);
//!     let stream = mailsync_imap::connection::connect(&config).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.login("user@example.com", "password").await?;
//!     let (mut client, status) = client.examine("INBOX").await?;
//!     let uids = client.uid_search(&SearchCriteria::All).await?;
//!     println!("{} messages, validity {:?}", uids.len(), status.uid_validity);
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, FramedStream, ImapStream, NotAuthenticated, Refused,
    ResponseAccumulator, Security, Selected, Timeouts, Transition,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capability, MailboxStatus, ResponseCode, SeqNum, Status, Tag, Uid, UidSet, UidValidity,
};
