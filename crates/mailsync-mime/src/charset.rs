//! Charset conversion for decoded bodies and header words.
//!
//! Only the charsets that dominate real mailboxes are mapped exactly. Anything
//! else is read as UTF-8 with replacement characters, which keeps ASCII intact.

/// Windows-1252 code points for bytes 0x80..=0x9F. Undefined slots map to
/// U+FFFD.
const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}', '\u{017D}', '\u{FFFD}',
    '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

/// Decodes `bytes` in the named charset into a `String`.
///
/// Charset names are matched case-insensitively, with or without quotes.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    let name = charset.trim().trim_matches('"').to_ascii_lowercase();
    match name.as_str() {
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        "windows-1252" | "cp1252" | "x-cp1252" => bytes.iter().map(|&b| windows_1252(b)).collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn windows_1252(b: u8) -> char {
    match b {
        0x80..=0x9F => WINDOWS_1252_HIGH[usize::from(b - 0x80)],
        _ => char::from(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_and_unknown_are_lossy() {
        assert_eq!(decode_charset("héllo".as_bytes(), "UTF-8"), "héllo");
        assert_eq!(decode_charset(b"ok\xFF", "utf-8"), "ok\u{FFFD}");
        assert_eq!(decode_charset(b"plain", "x-unknown"), "plain");
    }

    #[test]
    fn test_latin1() {
        assert_eq!(decode_charset(b"caf\xE9", "ISO-8859-1"), "café");
        assert_eq!(decode_charset(b"caf\xE9", "\"latin1\""), "café");
    }

    #[test]
    fn test_windows_1252_specials() {
        assert_eq!(decode_charset(b"\x93quoted\x94", "windows-1252"), "\u{201C}quoted\u{201D}");
        assert_eq!(decode_charset(b"\x80 5", "cp1252"), "\u{20AC} 5");
        assert_eq!(decode_charset(b"\x81", "cp1252"), "\u{FFFD}");
    }
}
