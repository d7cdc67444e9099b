//! Header block parsing.

use crate::encoding::decode_rfc2047;

/// Ordered collection of header fields.
///
/// Lookups are case-insensitive; repeated fields keep arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the raw value of the first field named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first value with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Returns every raw value for `name`, in order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a header block.
    ///
    /// Folded lines are unfolded with a single space. Lines without a colon
    /// are ignored. Parsing stops at the first empty line.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }

            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() && !name.contains(char::is_whitespace) {
                    current = Some((name.to_string(), value.trim().to_string()));
                }
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        headers
    }
}

/// Splits raw bytes at the first blank line into header and body.
///
/// Accepts both CRLF and bare LF line endings. Without a blank line the whole
/// input is treated as headers.
#[must_use]
pub fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut i = 0;
    let mut line_start = true;

    while i < raw.len() {
        if line_start {
            if raw[i..].starts_with(b"\r\n") {
                return (&raw[..i], &raw[i + 2..]);
            }
            if raw[i] == b'\n' {
                return (&raw[..i], &raw[i + 1..]);
            }
        }
        line_start = raw[i] == b'\n';
        i += 1;
    }

    (raw, &[])
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

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Not-A-Header: body\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("from"), Some("sender@example.com"));
        assert_eq!(headers.get("SUBJECT"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("Not-A-Header").is_none());
    }

    #[test]
    fn test_headers_keep_order_of_repeats() {
        let headers = Headers::parse("Received: one\nX: y\nReceived: two\n");
        assert_eq!(headers.get_all("received"), vec!["one", "two"]);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Received", "X", "Received"]);
    }

    #[test]
    fn test_headers_skip_garbage_lines() {
        let headers = Headers::parse("garbage line\nBad Name: x\nSubject: ok\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Subject"), Some("ok"));
    }

    #[test]
    fn test_get_decoded() {
        let headers = Headers::parse("Subject: =?UTF-8?B?SMOpbGxv?=\r\n");
        assert_eq!(headers.get_decoded("subject").unwrap(), "Héllo");
    }

    #[test]
    fn test_split_header_body() {
        let (h, b) = split_header_body(b"A: 1\r\nB: 2\r\n\r\nbody\r\n");
        assert_eq!(h, b"A: 1\r\nB: 2\r\n");
        assert_eq!(b, b"body\r\n");

        let (h, b) = split_header_body(b"A: 1\n\nbody");
        assert_eq!(h, b"A: 1\n");
        assert_eq!(b, b"body");

        let (h, b) = split_header_body(b"A: 1\r\n");
        assert_eq!(h, b"A: 1\r\n");
        assert!(b.is_empty());
    }

    #[test]
    fn test_split_header_body_empty_headers() {
        let (h, b) = split_header_body(b"\r\nonly body");
        assert!(h.is_empty());
        assert_eq!(b, b"only body");
    }
}
