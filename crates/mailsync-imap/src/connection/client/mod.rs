//! Type-state IMAP client connection.
//!
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: initial state after the greeting
//! - `Authenticated`: after a successful LOGIN
//! - `Selected`: after a successful SELECT/EXAMINE
//!
//! Each state only exposes the commands valid in it.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator};
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// Result of a state change: the new state, or the refusal with the
/// connection still in the old state.
pub type Transition<S, Prev, Next> = std::result::Result<Next, Box<Refused<S, Prev>>>;

/// A command that would have changed state and was refused.
///
/// The connection is handed back so the caller can still log out.
pub struct Refused<S, State> {
    /// Why the command failed.
    pub error: Error,
    /// The connection, unchanged in state.
    pub client: Client<S, State>,
}

impl<S, State> Refused<S, State> {
    pub(crate) fn boxed(error: Error, client: Client<S, State>) -> Box<Self> {
        Box::new(Self { error, client })
    }
}

impl<S, State> std::fmt::Debug for Refused<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refused")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S, State> From<Box<Refused<S, State>>> for Error {
    fn from(refused: Box<Refused<S, State>>) -> Self {
        refused.error
    }
}

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) io_timeout: Option<Duration>,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Moves the connection into another state.
    pub(crate) fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            _state: PhantomData,
        }
    }

    /// Bounds every subsequent command round-trip by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Sends CAPABILITY and replaces the stored capabilities.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        self.capabilities.clear();
        self.execute(&Command::Capability).await?;
        Ok(self.capabilities.clone())
    }

    /// Sends LOGOUT and closes the session.
    pub async fn logout(mut self) -> Result<()> {
        match self.execute(&Command::Logout).await {
            // Some servers hang up right after the untagged BYE.
            Ok(_) | Err(Error::Io(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Sends a command and returns every response up to its tagged completion.
    ///
    /// Capability updates carried by the responses are applied, and a non-OK
    /// completion is turned into an error.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Vec<Vec<u8>>> {
        let tag = self.tag_gen.next();
        debug!(tag = %tag, command = command.name(), "sending IMAP command");

        let limit = self.io_timeout;
        let stream = &mut self.stream;
        let round_trip = async {
            stream.write_command(&command.serialize(&tag)).await?;
            ResponseAccumulator::new(tag.as_str())
                .read_until_tagged(stream)
                .await
        };

        let responses = match limit {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => round_trip.await?,
        };

        self.absorb_capabilities(&responses);
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(responses)
    }

    fn absorb_capabilities(&mut self, responses: &[Vec<u8>]) {
        for bytes in responses {
            match ResponseParser::parse(bytes) {
                Ok(
                    Response::Untagged(UntaggedResponse::Capability(caps))
                    | Response::Untagged(UntaggedResponse::Condition {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    })
                    | Response::Tagged {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    },
                ) => self.capabilities = caps,
                _ => {}
            }
        }
    }

    /// Checks that the response tagged `tag` is OK.
    pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
        for bytes in responses.iter().rev() {
            if let Ok(Response::Tagged {
                tag: resp_tag,
                status,
                code,
                text,
            }) = ResponseParser::parse(bytes)
                && resp_tag.as_str() == tag
            {
                return match status {
                    Status::Ok | Status::PreAuth => Ok(()),
                    Status::No if code == Some(ResponseCode::AuthenticationFailed) => {
                        Err(Error::Auth(text))
                    }
                    Status::No => Err(Error::No(text)),
                    Status::Bad => Err(Error::Bad(text)),
                    Status::Bye => Err(Error::Bye(text)),
                };
            }
        }

        Err(Error::Protocol("missing tagged response".to_string()))
    }
}
