//! Transfer-encoding and header-encoding decoders.
//!
//! Base64 and Quoted-Printable bodies (RFC 2045) and RFC 2047 encoded words.
//! Decoders are lenient where real-world mail is sloppy: base64 padding may be
//! missing and stray `=` in quoted-printable text is kept literally.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::charset::decode_charset;
use crate::error::{Error, Result};

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes a base64 body, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input contains characters outside the alphabet.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(cleaned).map_err(Into::into)
}

/// Decodes a Quoted-Printable body into raw bytes.
///
/// Soft line breaks (`=` at end of line) are removed and `=XX` escapes are
/// expanded. Malformed escapes are passed through unchanged.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        match (data.get(i + 1), data.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    out
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped; words that fail
/// to decode are kept verbatim.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut last_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);

        let Some((decoded, consumed)) = decode_encoded_word(candidate) else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            last_was_word = false;
            continue;
        };

        if !(last_was_word && before.trim().is_empty()) {
            out.push_str(before);
        }
        out.push_str(&decoded);
        rest = &candidate[consumed..];
        last_was_word = true;
    }

    out.push_str(rest);
    out
}

/// Decodes one `=?charset?enc?text?=` word at the start of `s`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(s: &str) -> Option<(String, usize)> {
    let body = s.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let payload = &body[..end];
    if payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => decode_q(payload),
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((decode_charset(&bytes, charset), consumed))
}

fn decode_q(payload: &str) -> Vec<u8> {
    let underscored: Vec<u8> = payload
        .bytes()
        .map(|b| if b == b'_' { b' ' } else { b })
        .collect();
    decode_quoted_printable(&underscored)
}

/// Decodes a body according to a `Content-Transfer-Encoding` value.
///
/// # Errors
///
/// Returns an error if a base64 body is corrupt.
pub fn decode_transfer(encoding: &str, body: &[u8]) -> Result<Vec<u8>> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "base64" => decode_base64(body),
        "quoted-printable" => Ok(decode_quoted_printable(body)),
        "" | "7bit" | "8bit" | "binary" => Ok(body.to_vec()),
        other if other.starts_with("x-") => Ok(body.to_vec()),
        other => Err(Error::InvalidEncoding(other.to_string())),
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

    #[test]
    fn test_base64_with_line_breaks_and_no_padding() {
        assert_eq!(decode_base64(b"SGVs\r\nbG8=").unwrap(), b"Hello");
        assert_eq!(decode_base64(b"SGVsbG8").unwrap(), b"Hello");
        assert!(decode_base64(b"!!!!").is_err());
    }

    #[test]
    fn test_quoted_printable() {
        assert_eq!(decode_quoted_printable(b"caf=C3=A9"), "café".as_bytes());
        assert_eq!(decode_quoted_printable(b"soft=\r\nbreak"), b"softbreak");
        assert_eq!(decode_quoted_printable(b"unix=\nbreak"), b"unixbreak");
        assert_eq!(decode_quoted_printable(b"1 + 1 = 2"), b"1 + 1 = 2");
        assert_eq!(decode_quoted_printable(b"end="), b"end=");
    }

    #[test]
    fn test_rfc2047_base64_and_q() {
        assert_eq!(decode_rfc2047("=?UTF-8?B?SGVsbG8gV29ybGQ=?="), "Hello World");
        assert_eq!(decode_rfc2047("=?iso-8859-1?Q?caf=E9_noir?="), "café noir");
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        assert_eq!(
            decode_rfc2047("=?UTF-8?Q?Hello?= =?UTF-8?Q?_World?="),
            "Hello World"
        );
    }

    #[test]
    fn test_rfc2047_mixed_with_plain_text() {
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?q?R=C3=A9union?= tomorrow"),
            "Re: Réunion tomorrow"
        );
    }

    #[test]
    fn test_rfc2047_malformed_is_kept() {
        assert_eq!(decode_rfc2047("=?broken"), "=?broken");
        assert_eq!(decode_rfc2047("a =?x?Z?abc?= b"), "a =?x?Z?abc?= b");
        assert_eq!(decode_rfc2047("plain subject"), "plain subject");
    }

    #[test]
    fn test_decode_transfer() {
        assert_eq!(decode_transfer("BASE64", b"aGk=").unwrap(), b"hi");
        assert_eq!(decode_transfer("7bit", b"hi").unwrap(), b"hi");
        assert!(matches!(
            decode_transfer("uuencode", b"hi"),
            Err(Error::InvalidEncoding(_))
        ));
    }
}
