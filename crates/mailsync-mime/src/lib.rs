//! # mailsync-mime
//!
//! Tolerant MIME parsing for messages fetched from a mail server.
//!
//! ## Features
//!
//! - **Message parsing**: headers, recursive multipart trees, body discovery
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Charsets**: UTF-8, ISO-8859-1 and Windows-1252, lossy otherwise
//! - **Attachments**: disposition and file name detection
//! - **Dates**: RFC 2822 `Date:` headers and IMAP INTERNALDATE
//!
//! Malformed input degrades instead of failing: a multipart without a
//! boundary becomes a single leaf, unknown charsets decode lossily.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_mime::Message;
//!
//! let raw = b"From: sender@example.com\r\n\
//!             Subject: Test\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let message = Message::parse(raw)?;
//! println!("Subject: {}", message.subject().unwrap_or_default());
//! println!("Body: {}", message.text_body()?.unwrap_or_default());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod charset;
mod content_type;
mod date;
mod error;
mod header;
mod message;

pub mod encoding;

pub use charset::decode_charset;
pub use content_type::{ContentDisposition, ContentType};
pub use date::{parse_date, parse_internal_date};
pub use error::{Error, Result};
pub use header::{Headers, split_header_body};
pub use message::{Message, Part, PartBody};
