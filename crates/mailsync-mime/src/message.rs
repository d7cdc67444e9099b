//! MIME message structure and handling.

use chrono::{DateTime, FixedOffset};

use crate::charset::decode_charset;
use crate::content_type::{ContentDisposition, ContentType};
use crate::date::parse_date;
use crate::encoding::decode_transfer;
use crate::error::{Error, Result};
use crate::header::{Headers, split_header_body};

/// Nesting limit for multipart trees. Deeper parts are kept as opaque leaves.
const MAX_DEPTH: usize = 32;

/// Body of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// Raw, still transfer-encoded bytes of a single part.
    Leaf(Vec<u8>),
    /// Children of a multipart container, in order.
    Multipart(Vec<Part>),
}

/// MIME message part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body.
    pub body: PartBody,
}

impl Part {
    fn parse(raw: &[u8], depth: usize) -> Self {
        let (head, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head));
        let content_type = content_type_of(&headers);

        let body = if content_type.is_multipart() && depth < MAX_DEPTH {
            match split_children(&content_type, body) {
                Ok(children) => PartBody::Multipart(
                    children
                        .into_iter()
                        .map(|child| Self::parse(child, depth + 1))
                        .collect(),
                ),
                Err(_) => PartBody::Leaf(body.to_vec()),
            }
        } else {
            PartBody::Leaf(body.to_vec())
        };

        Self { headers, body }
    }

    /// Returns the content type, defaulting to `text/plain` when the header
    /// is missing or malformed.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        content_type_of(&self.headers)
    }

    /// Returns the parsed `Content-Disposition`, if present.
    #[must_use]
    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Returns the attachment file name from the disposition or the
    /// content type `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        self.disposition()
            .and_then(|d| d.filename())
            .or_else(|| self.content_type().name())
    }

    /// Returns true if this part is an attachment.
    ///
    /// A part is an attachment when its disposition says so, or when it has
    /// no disposition but carries a file name and is not a text body.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        if matches!(self.body, PartBody::Multipart(_)) {
            return false;
        }
        match self.disposition() {
            Some(d) if d.is_attachment() => true,
            Some(_) => false,
            None => {
                let ct = self.content_type();
                self.filename().is_some() && !ct.is("text", "plain") && !ct.is("text", "html")
            }
        }
    }

    /// Decodes the body according to `Content-Transfer-Encoding`.
    ///
    /// Multipart containers have no body of their own and decode to nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer encoding is unknown or corrupt.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match &self.body {
            PartBody::Leaf(raw) => decode_transfer(
                self.headers
                    .get("content-transfer-encoding")
                    .unwrap_or_default(),
                raw,
            ),
            PartBody::Multipart(_) => Ok(Vec::new()),
        }
    }

    /// Decodes the body to text using the part's charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        let bytes = self.decode_body()?;
        let content_type = self.content_type();
        Ok(decode_charset(
            &bytes,
            content_type.charset().unwrap_or("utf-8"),
        ))
    }

    /// Iterates over this part and all descendants, depth-first.
    pub fn walk(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let part = stack.pop()?;
            if let PartBody::Multipart(children) = &part.body {
                stack.extend(children.iter().rev());
            }
            Some(part)
        })
    }
}

fn content_type_of(headers: &Headers) -> ContentType {
    headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok())
        .unwrap_or_default()
}

/// Splits a multipart body into the raw bytes of each child.
fn split_children<'a>(content_type: &ContentType, body: &'a [u8]) -> Result<Vec<&'a [u8]>> {
    let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut children = Vec::new();
    let mut current: Option<usize> = None;
    let mut found = false;
    let mut pos = 0;

    while pos < body.len() {
        let end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let line = body[pos..end].trim_ascii_end();

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest.starts_with(b"--");
            if rest.is_empty() || closing {
                found = true;
                if let Some(start) = current.take() {
                    children.push(strip_line_break(&body[start..pos]));
                }
                if closing {
                    return Ok(children);
                }
                current = Some((end + 1).min(body.len()));
            }
        }
        pos = end + 1;
    }

    if !found {
        return Err(Error::Parse(format!("no delimiter for boundary {boundary}")));
    }
    // Unterminated: keep what follows the last delimiter.
    if let Some(start) = current {
        children.push(&body[start..]);
    }
    Ok(children)
}

fn strip_line_break(bytes: &[u8]) -> &[u8] {
    bytes
        .strip_suffix(b"\r\n")
        .or_else(|| bytes.strip_suffix(b"\n"))
        .unwrap_or(bytes)
}

/// Parsed email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    root: Part,
}

impl Message {
    /// Parses a complete RFC 5322 message.
    ///
    /// Parsing is tolerant: malformed content types, missing boundaries and
    /// unterminated multiparts degrade to plain leaves.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or has no header fields.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Parse("empty message".to_string()));
        }

        let root = Part::parse(raw, 0);
        if root.headers.is_empty() {
            return Err(Error::InvalidHeader(
                "no header fields before body".to_string(),
            ));
        }
        Ok(Self { root })
    }

    /// Returns the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Returns the root part.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Decoded `From` header.
    #[must_use]
    pub fn from(&self) -> Option<String> {
        self.root.headers.get_decoded("from")
    }

    /// Decoded `To` header.
    #[must_use]
    pub fn to(&self) -> Option<String> {
        self.root.headers.get_decoded("to")
    }

    /// Decoded `Subject` header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.root.headers.get_decoded("subject")
    }

    /// `Message-ID` without angle brackets. Empty ids are `None`.
    #[must_use]
    pub fn message_id(&self) -> Option<String> {
        let id = self.root.headers.get("message-id")?.trim();
        let id = id.strip_prefix('<').unwrap_or(id);
        let id = id.strip_suffix('>').unwrap_or(id).trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    /// Parsed `Date` header.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.root.headers.get("date").and_then(parse_date)
    }

    /// First `text/plain` body part that is not an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if that part cannot be decoded.
    pub fn text_body(&self) -> Result<Option<String>> {
        self.first_body("plain")
    }

    /// First `text/html` body part that is not an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if that part cannot be decoded.
    pub fn html_body(&self) -> Result<Option<String>> {
        self.first_body("html")
    }

    fn first_body(&self, sub_type: &str) -> Result<Option<String>> {
        self.root
            .walk()
            .filter(|part| matches!(part.body, PartBody::Leaf(_)))
            .find(|part| part.content_type().is("text", sub_type) && !part.is_attachment())
            .map(Part::body_text)
            .transpose()
    }

    /// All attachment parts, in document order.
    #[must_use]
    pub fn attachments(&self) -> Vec<&Part> {
        self.root.walk().filter(|part| part.is_attachment()).collect()
    }

    /// Returns true if the message has at least one attachment.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        self.root.walk().any(Part::is_attachment)
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

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: =?UTF-8?Q?Caf=C3=A9?= plans\r\n\
Message-ID: <abc123@example.com>\r\n\
Date: Fri, 01 Mar 2024 10:00:00 +0100\r\n\
\r\n\
Hello Bob\r\n";

    const MIXED: &[u8] = b"From: alice@example.com\r\n\
Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
preamble\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Voil=E0 le rapport\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Voil\xC3\xA0</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--outer--\r\n\
epilogue\r\n";

    #[test]
    fn test_simple_message() {
        let message = Message::parse(SIMPLE).unwrap();
        assert_eq!(message.from().unwrap(), "Alice <alice@example.com>");
        assert_eq!(message.to().unwrap(), "bob@example.com");
        assert_eq!(message.subject().unwrap(), "Café plans");
        assert_eq!(message.message_id().unwrap(), "abc123@example.com");
        assert_eq!(
            message.date().unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+01:00"
        );
        assert_eq!(message.text_body().unwrap().unwrap(), "Hello Bob\r\n");
        assert!(message.html_body().unwrap().is_none());
        assert!(!message.has_attachments());
    }

    #[test]
    fn test_nested_multipart() {
        let message = Message::parse(MIXED).unwrap();
        assert_eq!(message.text_body().unwrap().unwrap(), "Voilà le rapport");
        assert_eq!(message.html_body().unwrap().unwrap(), "<p>Voilà</p>");

        let attachments = message.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename().unwrap(), "report.pdf");
        assert_eq!(attachments[0].decode_body().unwrap(), b"%PDF-1.4");
        assert!(message.has_attachments());

        let PartBody::Multipart(children) = &message.root().body else {
            panic!("expected multipart root");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_text_attachment_is_not_body() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: text/html\r\n\r\n\
<b>hi</b>\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=notes.txt\r\n\r\n\
notes\r\n\
--b--\r\n";
        let message = Message::parse(raw).unwrap();
        assert!(message.text_body().unwrap().is_none());
        assert_eq!(message.html_body().unwrap().unwrap(), "<b>hi</b>");
        assert!(message.has_attachments());
    }

    #[test]
    fn test_named_image_without_disposition_is_attachment() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n\
--b\n\
Content-Type: text/plain\n\nbody\n\
--b\n\
Content-Type: image/png; name=dot.png\n\nxx\n\
--b--\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.text_body().unwrap().unwrap(), "body");
        assert_eq!(message.attachments().len(), 1);
    }

    #[test]
    fn test_inline_disposition_is_not_attachment() {
        let raw = b"Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: image/png; name=logo.png\r\n\
Content-Disposition: inline; filename=logo.png\r\n\r\n\
xx\r\n\
--b--\r\n";
        let message = Message::parse(raw).unwrap();
        assert!(!message.has_attachments());
    }

    #[test]
    fn test_missing_boundary_degrades_to_leaf() {
        let raw = b"Subject: x\r\nContent-Type: multipart/mixed\r\n\r\nraw body\r\n";
        let message = Message::parse(raw).unwrap();
        assert!(matches!(message.root().body, PartBody::Leaf(_)));
    }

    #[test]
    fn test_absent_delimiter_degrades_to_leaf() {
        let raw = b"Subject: x\r\nContent-Type: multipart/mixed; boundary=zz\r\n\r\nno parts\r\n";
        let message = Message::parse(raw).unwrap();
        assert!(matches!(message.root().body, PartBody::Leaf(_)));
    }

    #[test]
    fn test_unterminated_multipart_keeps_last_part() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: text/plain\r\n\r\n\
cut off";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.text_body().unwrap().unwrap(), "cut off");
    }

    #[test]
    fn test_corrupt_base64_body_is_error() {
        let raw = b"Content-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\n@@@@\r\n";
        let message = Message::parse(raw).unwrap();
        assert!(message.text_body().is_err());
    }

    #[test]
    fn test_empty_and_headerless_input() {
        assert!(matches!(Message::parse(b""), Err(Error::Parse(_))));
        assert!(matches!(Message::parse(b"\r\n \r\n"), Err(Error::Parse(_))));
        assert!(matches!(
            Message::parse(b"just some text\r\n"),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_blank_message_id() {
        let message = Message::parse(b"Message-ID: <>\r\nSubject: s\r\n\r\n").unwrap();
        assert!(message.message_id().is_none());
        let message = Message::parse(b"Subject: s\r\n\r\n").unwrap();
        assert!(message.message_id().is_none());
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let mut raw = Vec::new();
        for depth in 0..40 {
            raw.extend_from_slice(
                format!("Content-Type: multipart/mixed; boundary=b{depth}\r\n\r\n--b{depth}\r\n")
                    .as_bytes(),
            );
        }
        raw.extend_from_slice(b"Content-Type: text/plain\r\n\r\ndeep\r\n");
        let message = Message::parse(&raw).unwrap();
        let depth = message
            .root()
            .walk()
            .filter(|p| matches!(p.body, PartBody::Multipart(_)))
            .count();
        assert_eq!(depth, MAX_DEPTH);
    }

    proptest::proptest! {
        #[test]
        fn prop_parse_never_panics(raw in proptest::collection::vec(proptest::num::u8::ANY, 0..512)) {
            if let Ok(message) = Message::parse(&raw) {
                let _ = message.text_body();
                let _ = message.html_body();
                let _ = message.has_attachments();
            }
        }
    }
}
