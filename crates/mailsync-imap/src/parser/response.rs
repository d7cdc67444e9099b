//! IMAP response parser.
//!
//! Parses the server responses produced by the commands in [`crate::command`].

#![allow(clippy::missing_errors_doc)]

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, ResponseCode, SeqNum, Status, Tag, Uid, UidValidity};
use crate::{Error, Result};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text.
        text: Option<String>,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// Condition response (`* OK`, `* NO`, `* BAD`, `* PREAUTH`, `* BYE`).
    Condition {
        /// Status keyword.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY data.
    Capability(Vec<Capability>),
    /// FLAGS defined in the selected mailbox.
    Flags(Vec<String>),
    /// SEARCH results (UIDs for UID SEARCH).
    Search(Vec<u32>),
    /// Number of messages in the mailbox.
    Exists(u32),
    /// Number of recent messages.
    Recent(u32),
    /// A message was expunged.
    Expunge(SeqNum),
    /// FETCH data for one message.
    Fetch {
        /// Sequence number of the message.
        seq: SeqNum,
        /// Returned attributes.
        items: Vec<FetchItem>,
    },
}

/// FETCH response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// UID as sent by the server. Zero is kept so callers can reject it.
    Uid(u32),
    /// Message flags.
    Flags(Vec<String>),
    /// Internal date string (`dd-Mon-yyyy hh:mm:ss +zzzz`).
    InternalDate(String),
    /// RFC822 size.
    Rfc822Size(u32),
    /// BODY section data.
    Body {
        /// Section specifier (empty for the whole message).
        section: String,
        /// Section bytes, `None` for NIL.
        data: Option<Vec<u8>>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response (one line plus any embedded literals).
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let untagged = match lexer.next_token()? {
            Token::Atom(keyword) => match keyword.to_ascii_uppercase().as_str() {
                "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                    let status = status_from_keyword(keyword).ok_or_else(|| {
                        lexer.error(&format!("Invalid status: {keyword}"))
                    })?;
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Condition { status, code, text }
                }
                "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
                "FLAGS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Flags(parse_flag_list(lexer)?)
                }
                "SEARCH" => UntaggedResponse::Search(parse_search_data(lexer)?),
                _ => {
                    return Err(lexer.error(&format!("Unknown untagged response: {keyword}")));
                }
            },
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                match keyword.to_ascii_uppercase().as_str() {
                    "EXISTS" => UntaggedResponse::Exists(n),
                    "RECENT" => UntaggedResponse::Recent(n),
                    "EXPUNGE" => UntaggedResponse::Expunge(seq_num(lexer, n)?),
                    "FETCH" => {
                        let seq = seq_num(lexer, n)?;
                        lexer.expect_space()?;
                        let items = parse_fetch_items(lexer)?;
                        UntaggedResponse::Fetch { seq, items }
                    }
                    _ => return Err(lexer.error(&format!("Unknown message data: {keyword}"))),
                }
            }
            token => {
                return Err(lexer.error(&format!(
                    "Unexpected token in untagged response: {token:?}"
                )));
            }
        };

        Ok(Response::Untagged(untagged))
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }
        let text = read_text_until_crlf(lexer);
        Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        }
    }

    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        status_from_keyword(s).ok_or_else(|| lexer.error(&format!("Invalid status: {s}")))
    }

    /// Parses ` [CODE ...] text` following a status keyword.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        Ok((code, read_text_until_crlf(lexer)))
    }
}

fn status_from_keyword(s: &str) -> Option<Status> {
    match s.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}

fn seq_num(lexer: &Lexer<'_>, n: u32) -> Result<SeqNum> {
    SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))
}

fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;
    let atom = lexer.read_atom_string()?;

    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            Uid::new(n).map_or_else(
                || ResponseCode::Unknown(atom.to_string()),
                ResponseCode::UidNext,
            )
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            UidValidity::new(n).map_or_else(
                || ResponseCode::Unknown(atom.to_string()),
                ResponseCode::UidValidity,
            )
        }
        _ => ResponseCode::Unknown(atom.to_string()),
    };

    // Arguments of codes we do not model (PERMANENTFLAGS, APPENDUID, ...)
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        match lexer.next_token()? {
            Token::Atom(s) => caps.push(Capability::parse(s)),
            Token::Number(n) => caps.push(Capability::Unknown(n.to_string())),
            _ => {}
        }
    }
    Ok(caps)
}

fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect(Token::LParen)?;
    let mut flags = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => flags.push(s.to_string()),
            // `\*` in PERMANENTFLAGS-like lists lexes as `\` atom then asterisk.
            Token::Asterisk => {}
            token => return Err(lexer.error(&format!("Unexpected token in flag list: {token:?}"))),
        }
    }

    Ok(flags)
}

fn parse_search_data(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        match lexer.next_token()? {
            Token::Number(n) if n > 0 => ids.push(n),
            // ESEARCH-style trailers such as `(MODSEQ 123)` end the id list.
            Token::LParen => break,
            _ => {}
        }
    }
    Ok(ids)
}

fn parse_fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;
    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => match name.to_ascii_uppercase().as_str() {
                "UID" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Uid(lexer.read_number()?));
                }
                "FLAGS" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Flags(parse_flag_list(lexer)?));
                }
                "RFC822.SIZE" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Rfc822Size(lexer.read_number()?));
                }
                "INTERNALDATE" => {
                    lexer.expect_space()?;
                    if let Token::QuotedString(date) = lexer.next_token()? {
                        items.push(FetchItem::InternalDate(date));
                    }
                }
                "BODY" | "BODY.PEEK" | "RFC822" => {
                    let section = read_section(lexer)?;
                    lexer.expect_space()?;
                    let data = lexer.read_nstring_bytes()?;
                    items.push(FetchItem::Body { section, data });
                }
                _ => skip_fetch_value(lexer)?,
            },
            token => return Err(lexer.error(&format!("Unexpected token in FETCH: {token:?}"))),
        }
    }

    Ok(items)
}

/// Reads an optional `[section]` and `<origin>` following BODY.
fn read_section(lexer: &mut Lexer<'_>) -> Result<String> {
    let mut section = String::new();
    if lexer.peek() == Some(b'[') {
        lexer.advance();
        loop {
            match lexer.advance() {
                Some(b']') => break,
                Some(b) => section.push(char::from(b)),
                None => return Err(lexer.error("Unterminated BODY section")),
            }
        }
    }
    if lexer.peek() == Some(b'<') {
        while let Some(b) = lexer.advance() {
            if b == b'>' {
                break;
            }
        }
    }
    Ok(section)
}

/// Skips the value of an attribute this client never requests.
fn skip_fetch_value(lexer: &mut Lexer<'_>) -> Result<()> {
    if lexer.peek() == Some(b'[') {
        read_section(lexer)?;
    }
    lexer.expect_space()?;

    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(());
                }
            }
            Token::Eof | Token::Crlf => {
                return Err(lexer.error("Unexpected end of FETCH value"));
            }
            _ if depth == 0 => return Ok(()),
            _ => {}
        }
    }
}

/// Reads text until CRLF, consuming the CRLF.
fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();
    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end);
    if lexer.peek() == Some(b'\r') {
        lexer.skip(2);
    }

    String::from_utf8_lossy(&remaining[..end]).into_owned()
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

    fn untagged(input: &[u8]) -> UntaggedResponse {
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(u) => u,
            other => panic!("Expected untagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_greeting_with_capabilities() {
        let resp = untagged(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n");
        match resp {
            UntaggedResponse::Condition {
                status: Status::Ok,
                code: Some(ResponseCode::Capability(caps)),
                text,
            } => {
                assert!(caps.contains(&Capability::StartTls));
                assert!(caps.contains(&Capability::LoginDisabled));
                assert_eq!(text, "ready");
            }
            other => panic!("Expected OK with capabilities, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_no_with_code() {
        let resp =
            ResponseParser::parse(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
                .unwrap();
        assert_eq!(
            resp,
            Response::Tagged {
                tag: Tag::new("A0001"),
                status: Status::No,
                code: Some(ResponseCode::AuthenticationFailed),
                text: "Invalid credentials".to_string(),
            }
        );
    }

    #[test]
    fn test_tagged_without_text() {
        let resp = ResponseParser::parse(b"A0002 OK\r\n").unwrap();
        assert!(matches!(
            resp,
            Response::Tagged {
                status: Status::Ok,
                ..
            }
        ));
    }

    #[test]
    fn test_uidvalidity_and_permanentflags() {
        assert_eq!(
            untagged(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n"),
            UntaggedResponse::Condition {
                status: Status::Ok,
                code: Some(ResponseCode::UidValidity(UidValidity::new(3857529045).unwrap())),
                text: "UIDs valid".to_string(),
            }
        );
        let resp = untagged(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n");
        assert!(matches!(
            resp,
            UntaggedResponse::Condition {
                code: Some(ResponseCode::Unknown(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_exists_and_flags() {
        assert_eq!(untagged(b"* 172 EXISTS\r\n"), UntaggedResponse::Exists(172));
        assert_eq!(
            untagged(b"* FLAGS (\\Answered \\Seen)\r\n"),
            UntaggedResponse::Flags(vec!["\\Answered".to_string(), "\\Seen".to_string()])
        );
    }

    #[test]
    fn test_search() {
        assert_eq!(
            untagged(b"* SEARCH 2 84 882\r\n"),
            UntaggedResponse::Search(vec![2, 84, 882])
        );
        assert_eq!(untagged(b"* SEARCH\r\n"), UntaggedResponse::Search(vec![]));
    }

    #[test]
    fn test_fetch_summary() {
        let resp = untagged(
            b"* 12 FETCH (UID 4827 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 4286 FLAGS (\\Seen))\r\n",
        );
        let UntaggedResponse::Fetch { seq, items } = resp else {
            panic!("Expected FETCH");
        };
        assert_eq!(seq.get(), 12);
        assert_eq!(
            items,
            vec![
                FetchItem::Uid(4827),
                FetchItem::InternalDate("17-Jul-1996 02:44:25 -0700".to_string()),
                FetchItem::Rfc822Size(4286),
                FetchItem::Flags(vec!["\\Seen".to_string()]),
            ]
        );
    }

    #[test]
    fn test_fetch_zero_uid_is_preserved() {
        let UntaggedResponse::Fetch { items, .. } = untagged(b"* 1 FETCH (UID 0)\r\n") else {
            panic!("Expected FETCH");
        };
        assert_eq!(items, vec![FetchItem::Uid(0)]);
    }

    #[test]
    fn test_fetch_body_literal() {
        let UntaggedResponse::Fetch { items, .. } =
            untagged(b"* 3 FETCH (UID 9 BODY[] {11}\r\nSubject: x\n)\r\n")
        else {
            panic!("Expected FETCH");
        };
        assert_eq!(
            items,
            vec![
                FetchItem::Uid(9),
                FetchItem::Body {
                    section: String::new(),
                    data: Some(b"Subject: x\n".to_vec()),
                },
            ]
        );
    }

    #[test]
    fn test_fetch_skips_unrequested_items() {
        let UntaggedResponse::Fetch { items, .. } =
            untagged(b"* 3 FETCH (MODSEQ (12345) X-GM-LABELS (\\Inbox) UID 7)\r\n")
        else {
            panic!("Expected FETCH");
        };
        assert_eq!(items, vec![FetchItem::Uid(7)]);
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ Ready\r\n").unwrap(),
            Response::Continuation {
                text: Some("Ready".to_string())
            }
        );
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(ResponseParser::parse(b")))\r\n").is_err());
    }
}
