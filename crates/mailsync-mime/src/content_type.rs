//! `Content-Type` and `Content-Disposition` values.

use std::collections::HashMap;
use std::fmt;

use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart"), lowercased.
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "mixed"), lowercased.
    pub sub_type: String,
    /// Parameters keyed by lowercased name.
    pub parameters: HashMap<String, String>,
}

impl Default for ContentType {
    /// `text/plain; charset=us-ascii`, the RFC 2045 default.
    fn default() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }
}

impl ContentType {
    /// Creates a content type without parameters.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the `name` parameter, decoded.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.parameters.get("name").map(|n| decode_rfc2047(n))
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Checks if this is `type/subtype`.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type == main_type && self.sub_type == sub_type
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let (head, params) = split_params(s);

        let (main_type, sub_type) = head
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?;
        let main_type = main_type.trim().to_ascii_lowercase();
        let sub_type = sub_type.trim().to_ascii_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        Ok(Self {
            main_type,
            sub_type,
            parameters: params,
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)
    }
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased ("inline", "attachment").
    pub kind: String,
    /// Parameters keyed by lowercased name.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a disposition value. Never fails; an empty value yields an
    /// empty kind.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (head, parameters) = split_params(s);
        Self {
            kind: head.trim().to_ascii_lowercase(),
            parameters,
        }
    }

    /// True for `attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    /// Returns the `filename` parameter, decoded.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        self.parameters.get("filename").map(|n| decode_rfc2047(n))
    }
}

/// Splits `value; a=1; b="x;y"` into the leading value and its parameters.
fn split_params(s: &str) -> (&str, HashMap<String, String>) {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&s[start..]);

    let head = segments.first().copied().unwrap_or_default();
    let mut parameters = HashMap::new();
    for param in segments.iter().skip(1) {
        if let Some((key, value)) = param.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            // RFC 2231 extended values (name*=utf-8''x) are stored under the
            // plain name.
            let (key, value) = key.strip_suffix('*').map_or_else(
                || (key.clone(), value.trim().trim_matches('"').to_string()),
                |plain| (plain.to_string(), decode_extended_value(value.trim())),
            );
            if !key.is_empty() {
                parameters.entry(key).or_insert(value);
            }
        }
    }

    (head, parameters)
}

/// Decodes an RFC 2231 `charset'lang'percent-encoded` value.
fn decode_extended_value(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    let (Some(charset), Some(_lang), Some(encoded)) = (pieces.next(), pieces.next(), pieces.next())
    else {
        return value.trim_matches('"').to_string();
    };

    let mut bytes = Vec::with_capacity(encoded.len());
    let raw = encoded.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%'
            && let Some(hex) = encoded.get(i + 1..i + 3)
            && let Ok(b) = u8::from_str_radix(hex, 16)
        {
            bytes.push(b);
            i += 3;
            continue;
        }
        bytes.push(raw[i]);
        i += 1;
    }
    crate::charset::decode_charset(&bytes, charset)
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
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/HTML; Charset=\"UTF-8\"").unwrap();
        assert!(ct.is("text", "html"));
        assert_eq!(ct.charset(), Some("UTF-8"));
        assert_eq!(ct.to_string(), "text/html");
    }

    #[test]
    fn test_content_type_boundary_with_semicolon() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"a;b\"; x=1").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("a;b"));
        assert_eq!(ct.parameters.get("x").unwrap(), "1");
    }

    #[test]
    fn test_content_type_invalid() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
        assert!(ContentType::parse("").is_err());
    }

    #[test]
    fn test_content_type_default() {
        let ct = ContentType::default();
        assert!(ct.is("text", "plain"));
        assert_eq!(ct.charset(), Some("us-ascii"));
    }

    #[test]
    fn test_disposition() {
        let d = ContentDisposition::parse("ATTACHMENT; filename=\"report.pdf\"");
        assert!(d.is_attachment());
        assert_eq!(d.filename().unwrap(), "report.pdf");

        let inline = ContentDisposition::parse("inline");
        assert!(!inline.is_attachment());
        assert!(inline.filename().is_none());
    }

    #[test]
    fn test_extended_filename() {
        let d = ContentDisposition::parse("attachment; filename*=utf-8''r%C3%A9sum%C3%A9.pdf");
        assert_eq!(d.filename().unwrap(), "résumé.pdf");
    }

    #[test]
    fn test_encoded_word_name() {
        let ct = ContentType::parse("application/pdf; name=\"=?UTF-8?Q?caf=C3=A9.pdf?=\"").unwrap();
        assert_eq!(ct.name().unwrap(), "café.pdf");
    }
}
