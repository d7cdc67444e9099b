//! Conversion of fetched messages into storable records.

use chrono::{DateTime, SubsecRound, Utc};
use mailsync_mime::Message;
use thiserror::Error;

use super::source::{RawMessage, RemoteMessageRef};
use crate::message::NewMessage;

/// Maximum snippet length in characters, before the ellipsis.
pub const SNIPPET_LEN: usize = 200;

/// Marker appended to truncated snippets.
pub const ELLIPSIS: &str = "...";

/// A message that could not be turned into a record.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The message or its chosen body part could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] mailsync_mime::Error),
}

/// Normalizes a fetched message.
///
/// The summary supplies the fallback received time when the message has
/// no usable `Date` header.
///
/// # Errors
///
/// Returns [`NormalizeError::Decode`] if the message cannot be parsed or
/// its selected body cannot be decoded.
pub fn normalize(
    raw: &RawMessage,
    summary: Option<&RemoteMessageRef>,
) -> Result<NewMessage, NormalizeError> {
    let message = Message::parse(&raw.bytes)?;

    let content = extract_content(&message)?;
    let snippet = snippet(&content);

    let (message_id, synthetic_id) = message.message_id().map_or_else(
        || (uuid::Uuid::new_v4().to_string(), true),
        |id| (id, false),
    );

    let received_at = message
        .date()
        .or_else(|| summary.and_then(|s| s.internal_date))
        .map_or(DateTime::UNIX_EPOCH, |date| date.with_timezone(&Utc))
        .trunc_subsecs(0);

    Ok(NewMessage {
        message_id,
        synthetic_id,
        from: message.from().unwrap_or_default(),
        to: message.to().unwrap_or_default(),
        subject: message.subject().unwrap_or_default(),
        content,
        snippet,
        received_at,
        is_read: false,
        has_attachments: message.has_attachments(),
    })
}

/// Plain text if present, then tag-stripped HTML, then empty.
fn extract_content(message: &Message) -> Result<String, NormalizeError> {
    if let Some(text) = message.text_body()?
        && !text.is_empty()
    {
        return Ok(text);
    }

    Ok(message
        .html_body()?
        .map(|html| strip_tags(&html))
        .unwrap_or_default())
}

/// Removes everything between `<` and the next `>`.
///
/// Entities are left as-is. An unterminated `<` is kept with the rest of
/// the text.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

/// First [`SNIPPET_LEN`] characters, with [`ELLIPSIS`] when cut.
#[must_use]
pub fn snippet(content: &str) -> String {
    match content.char_indices().nth(SNIPPET_LEN) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::needless_collect)]
mod tests {
    use chrono::TimeZone;
    use mailsync_imap::Uid;
    use proptest::prelude::*;

    use super::*;

    fn raw(bytes: &[u8]) -> RawMessage {
        RawMessage {
            uid: Uid::new(1).unwrap(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_plain_message() {
        let record = normalize(
            &raw(b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: =?UTF-8?B?SGVsbG8=?= world\r\n\
Message-ID: <abc@example.com>\r\n\
Date: Fri, 01 Mar 2024 10:00:00 +0100\r\n\
\r\n\
Hi Bob\r\n"),
            None,
        )
        .unwrap();

        assert_eq!(record.message_id, "abc@example.com");
        assert!(!record.synthetic_id);
        assert_eq!(record.from, "Alice <alice@example.com>");
        assert_eq!(record.to, "bob@example.com");
        assert_eq!(record.subject, "Hello world");
        assert_eq!(record.content, "Hi Bob\r\n");
        assert_eq!(record.snippet, record.content);
        assert_eq!(
            record.received_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );
        assert!(!record.is_read);
        assert!(!record.has_attachments);
    }

    #[test]
    fn test_html_fallback_strips_tags_only() {
        let record = normalize(
            &raw(b"Message-ID: <h@x>\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Fish &amp; <b>chips</b></p>"),
            None,
        )
        .unwrap();
        assert_eq!(record.content, "Fish &amp; chips");
    }

    #[test]
    fn test_empty_text_prefers_html() {
        let record = normalize(
            &raw(b"Content-Type: multipart/alternative; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
<i>rich</i>\r\n\
--b--\r\n"),
            None,
        )
        .unwrap();
        assert_eq!(record.content, "rich");
    }

    #[test]
    fn test_no_body_parts_is_empty_content() {
        let record = normalize(
            &raw(b"Subject: pic\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n"),
            None,
        )
        .unwrap();
        assert_eq!(record.content, "");
        assert_eq!(record.snippet, "");
    }

    #[test]
    fn test_attachment_flag() {
        let record = normalize(
            &raw(b"Content-Type: multipart/mixed; boundary=\"xx\"\r\n\
\r\n\
--xx\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attached\r\n\
--xx\r\n\
Content-Type: application/pdf; name=\"a.pdf\"\r\n\
Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
\r\n\
JVBERi0=\r\n\
--xx--\r\n"),
            None,
        )
        .unwrap();
        assert!(record.has_attachments);
        assert_eq!(record.content, "see attached");
    }

    #[test]
    fn test_missing_message_id_is_synthetic_and_unique() {
        let bytes = b"Subject: no id\r\n\r\nbody";
        let first = normalize(&raw(bytes), None).unwrap();
        let second = normalize(&raw(bytes), None).unwrap();
        assert!(first.synthetic_id);
        assert!(uuid::Uuid::parse_str(&first.message_id).is_ok());
        assert_ne!(first.message_id, second.message_id);
        assert_eq!(first.composite_key(), second.composite_key());
    }

    #[test]
    fn test_received_falls_back_to_internal_date_then_epoch() {
        let summary = RemoteMessageRef {
            raw_uid: 1,
            internal_date: mailsync_mime::parse_internal_date("02-Apr-2024 08:30:00 +0000"),
            size: None,
            seen: true,
        };
        let bytes = b"Subject: undated\r\n\r\nx";

        let record = normalize(&raw(bytes), Some(&summary)).unwrap();
        assert_eq!(
            record.received_at,
            Utc.with_ymd_and_hms(2024, 4, 2, 8, 30, 0).unwrap()
        );
        assert!(!record.is_read);

        let record = normalize(&raw(bytes), None).unwrap();
        assert_eq!(record.received_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_unparseable_message_is_decode_error() {
        let err = normalize(&raw(b"   \r\n"), None).unwrap_err();
        assert!(matches!(err, NormalizeError::Decode(_)));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("a<br/>b"), "ab");
        assert_eq!(strip_tags("<<x>>"), ">");
        assert_eq!(strip_tags("1 < 2"), "1 < 2");
        assert_eq!(strip_tags("plain"), "plain");
    }

    #[test]
    fn test_snippet_boundaries() {
        let exact = "a".repeat(SNIPPET_LEN);
        assert_eq!(snippet(&exact), exact);

        let long = "é".repeat(SNIPPET_LEN + 1);
        let cut = snippet(&long);
        assert!(cut.ends_with(ELLIPSIS));
        assert_eq!(cut.chars().count(), SNIPPET_LEN + ELLIPSIS.len());
    }

    proptest! {
        #[test]
        fn prop_snippet_law(content in "\\PC{0,400}") {
            let chars: Vec<char> = content.chars().collect();
            let result = snippet(&content);
            if chars.len() <= SNIPPET_LEN {
                prop_assert_eq!(result, content);
            } else {
                let head: String = chars[..SNIPPET_LEN].iter().collect();
                prop_assert_eq!(result.chars().count(), SNIPPET_LEN + 3);
                prop_assert_eq!(result, format!("{head}{ELLIPSIS}"));
            }
        }
    }
}
