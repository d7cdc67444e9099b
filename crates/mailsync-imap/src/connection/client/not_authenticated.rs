//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{Client, Refused, Transition};
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::stream::ImapStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting and any capabilities it advertises.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let mut capabilities = Vec::new();
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            Response::Untagged(UntaggedResponse::Condition {
                code: Some(ResponseCode::Capability(caps)),
                ..
            }) => capabilities = caps,
            Response::Untagged(UntaggedResponse::Condition { .. }) => {}
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {other:?}"
                )));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            io_timeout: None,
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// A rejected LOGIN is reported as [`Error::Auth`], together with the
    /// unauthenticated connection.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Transition<S, NotAuthenticated, Client<S, Authenticated>> {
        if self.has_capability(&Capability::LoginDisabled) {
            let error = Error::Auth("server disabled LOGIN on this connection".to_string());
            return Err(Refused::boxed(error, self));
        }

        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.execute(&command).await {
            Ok(_) => {}
            Err(Error::No(text)) => return Err(Refused::boxed(Error::Auth(text), self)),
            Err(e) => return Err(Refused::boxed(e, self)),
        }

        debug!(username, "IMAP login accepted");
        Ok(self.transition())
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Negotiates STARTTLS and re-reads capabilities over the encrypted channel.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if self.stream_is_tls() {
            return Err(Error::InvalidState("Stream is already TLS".to_string()));
        }
        self.execute(&Command::StartTls).await?;

        let io_timeout = self.io_timeout;
        let stream = self.stream.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            stream: FramedStream::new(stream),
            tag_gen: self.tag_gen,
            capabilities: Vec::new(),
            io_timeout,
            _state: PhantomData,
        };
        client.capability().await?;
        Ok(client)
    }

    fn stream_is_tls(&self) -> bool {
        self.stream.get_ref().is_tls()
    }
}
