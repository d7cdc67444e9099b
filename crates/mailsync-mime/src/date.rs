//! Date parsing for `Date:` headers and IMAP INTERNALDATE values.

use chrono::{DateTime, FixedOffset};

/// Parses an RFC 2822 `Date:` header value.
///
/// Parenthesized comments such as `(UTC)` are removed and a missing weekday is
/// tolerated. Returns `None` when the value is not a recognizable date.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let cleaned = strip_comments(value);
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(&cleaned)
        .ok()
        .or_else(|| DateTime::parse_from_str(&cleaned, "%d %b %Y %H:%M:%S %z").ok())
        .or_else(|| DateTime::parse_from_str(&cleaned, "%a, %d %b %Y %H:%M %z").ok())
        .or_else(|| DateTime::parse_from_rfc3339(&cleaned).ok())
}

/// Parses an IMAP INTERNALDATE, e.g. `17-Jul-1996 02:44:25 -0700`.
#[must_use]
pub fn parse_internal_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
