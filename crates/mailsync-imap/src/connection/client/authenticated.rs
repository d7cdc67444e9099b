//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, Selected};
use super::{Client, Refused, Transition};
use crate::command::Command;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{MailboxStatus, ResponseCode};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens a mailbox read-only, so fetching never alters flags.
    ///
    /// On failure the connection is handed back still authenticated.
    pub async fn examine(
        mut self,
        mailbox: &str,
    ) -> Transition<S, Authenticated, (Client<S, Selected>, MailboxStatus)> {
        let command = Command::Examine {
            mailbox: mailbox.to_string(),
        };
        let responses = match self.execute(&command).await {
            Ok(responses) => responses,
            Err(e) => return Err(Refused::boxed(e, self)),
        };
        let mut status = parse_mailbox_status(&responses);
        status.read_only = true;
        Ok((self.transition(), status))
    }
}

/// Builds a [`MailboxStatus`] from the responses to EXAMINE.
pub(crate) fn parse_mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for bytes in responses {
        match ResponseParser::parse(bytes) {
            Ok(Response::Untagged(UntaggedResponse::Exists(n))) => status.exists = n,
            Ok(Response::Untagged(UntaggedResponse::Recent(n))) => status.recent = n,
            Ok(
                Response::Untagged(UntaggedResponse::Condition { code: Some(code), .. })
                | Response::Tagged { code: Some(code), .. },
            ) => match code {
                ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
                ResponseCode::UidNext(uid) => status.uid_next = Some(uid),
                ResponseCode::ReadOnly => status.read_only = true,
                ResponseCode::ReadWrite => status.read_only = false,
                _ => {}
            },
            _ => {}
        }
    }

    status
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
    fn test_parse_mailbox_status() {
        let responses: Vec<Vec<u8>> = vec![
            b"* 172 EXISTS\r\n".to_vec(),
            b"* 1 RECENT\r\n".to_vec(),
            b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n".to_vec(),
            b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n".to_vec(),
            b"* OK [UIDNEXT 4392] Predicted next UID\r\n".to_vec(),
            b"A0002 OK [READ-ONLY] EXAMINE completed\r\n".to_vec(),
        ];
        let status = parse_mailbox_status(&responses);
        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.uid_validity.unwrap().get(), 3857529045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert!(status.read_only);
    }

    #[test]
    fn test_parse_mailbox_status_tolerates_unknown_lines() {
        let responses: Vec<Vec<u8>> = vec![
            b"* 0 EXISTS\r\n".to_vec(),
            b"* LIST () \"/\" INBOX\r\n".to_vec(),
            b"A0002 OK [READ-WRITE] SELECT completed\r\n".to_vec(),
        ];
        let status = parse_mailbox_status(&responses);
        assert_eq!(status.exists, 0);
        assert!(status.uid_validity.is_none());
        assert!(!status.read_only);
    }
}
