//! Sans-I/O parser for IMAP server responses.
//!
//! - **Lexer**: tokenizes raw bytes into atoms, strings, literals and numbers
//! - **Response parser**: builds [`Response`] values from tokens
//!
//! # Example
//!
//! ```
//! use mailsync_imap::parser::{ResponseParser, Response, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 4 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(4)));
//! ```

pub mod lexer;
mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, UntaggedResponse};
