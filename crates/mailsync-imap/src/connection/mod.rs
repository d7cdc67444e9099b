//! IMAP connection management.
//!
//! - Server address, security mode and time limits
//! - TLS/plaintext stream abstraction
//! - Framed, literal-aware I/O
//! - Type-state client

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Refused, Selected, Transition};
pub use config::{Config, Security, Timeouts};
pub use framed::{FramedStream, ResponseAccumulator};
pub use stream::{ImapStream, connect, connect_plain, connect_tls, create_tls_connector};
