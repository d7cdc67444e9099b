//! Framed I/O for the IMAP protocol.
//!
//! A response is one CRLF-terminated line, extended by any `{n}` literal
//! announced at its end together with the line that follows the literal.

#![allow(clippy::missing_errors_doc)]

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Longest accepted line, literals excluded.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest accepted literal (a single fetched message).
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Buffered, literal-aware IMAP stream.
pub struct FramedStream<S> {
    reader: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, stream),
        }
    }

    /// Reads one complete response including embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let start = response.len();
            self.read_line_into(&mut response).await?;

            let Some(literal_len) = literal_length(&response[start..]) else {
                return Ok(response);
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let offset = response.len();
            response.resize(offset + literal_len, 0);
            self.reader.read_exact(&mut response[offset..]).await?;
        }
    }

    /// Appends one CRLF-terminated line to `out`.
    async fn read_line_into(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // A CR may end one read and its LF start the next.
            if out.len() > start && out.last() == Some(&b'\r') && buf[0] == b'\n' {
                out.push(b'\n');
                self.reader.consume(1);
                return Ok(());
            }

            if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
                out.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                return Ok(());
            }

            let len = buf.len();
            out.extend_from_slice(buf);
            self.reader.consume(len);

            if out.len() - start > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes and flushes a serialized command.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Returns the inner stream, dropping anything still buffered.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Parses the length of a `{n}` or `{n+}` literal announced at the end of a line.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Collects responses until the one tagged with a given tag.
pub struct ResponseAccumulator {
    tag: String,
}

impl ResponseAccumulator {
    /// Creates an accumulator for `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// Reads responses up to and including the tagged completion.
    pub async fn read_until_tagged<S>(&self, framed: &mut FramedStream<S>) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut responses = Vec::new();
        loop {
            let response = framed.read_response().await?;
            let done = self.is_completion(&response);
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
    }

    fn is_completion(&self, response: &[u8]) -> bool {
        response
            .strip_prefix(self.tag.as_bytes())
            .is_some_and(|rest| rest.first() == Some(&b' '))
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
    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_literal_length() {
        assert_eq!(literal_length(b"* 1 FETCH (BODY[] {123}\r\n"), Some(123));
        assert_eq!(literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(literal_length(b"A1 LOGIN {5+}\r\n"), Some(5));
        assert_eq!(literal_length(b"* OK no literal\r\n"), None);
        assert_eq!(literal_length(b"* OK {abc}\r\n"), None);
        assert_eq!(literal_length(b"* OK {}\r\n"), None);
        assert_eq!(literal_length(b"{12}"), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new().read(b"* OK split\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* OK split\r\n");
    }

    #[tokio::test]
    async fn test_read_literal_across_chunks() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (UID 4 BODY[] {7}\r\n")
            .read(b"Hi\r\n")
            .read(b"yo)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (UID 4 BODY[] {7}\r\nHi\r\nyo)\r\n"
        );
    }

    #[tokio::test]
    async fn test_literal_too_large() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            framed.read_response().await.unwrap_err(),
            Error::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"A0000 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"A0000 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_accumulator_stops_at_own_tag() {
        let mock = Builder::new()
            .read(b"* SEARCH 1 2\r\n")
            .read(b"A00001 OK not ours\r\n")
            .read(b"A0000 OK SEARCH completed\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let responses = ResponseAccumulator::new("A0000")
            .read_until_tagged(&mut framed)
            .await
            .unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[2], b"A0000 OK SEARCH completed\r\n");
    }
}
