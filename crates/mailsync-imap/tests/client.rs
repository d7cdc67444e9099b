//! Integration tests for the IMAP client.
//!
//! A mock stream replays scripted server output and records what the client
//! sends, so whole sessions run without a server.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailsync_imap::{
    Capability, Client, Error, FetchAttribute, FetchItem, NotAuthenticated, SearchCriteria, Uid,
    UidSet,
};

/// Mock stream that returns predefined responses.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                responses: Cursor::new(responses.to_vec()),
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = usize::try_from(self.responses.position()).unwrap();
        let data = self.responses.get_ref();
        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let to_read = (data.len() - pos).min(buf.remaining());
        buf.put_slice(&data[pos..pos + to_read]);
        self.responses.set_position((pos + to_read) as u64);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

const MESSAGE: &[u8] = b"From: a@example.com\r\nSubject: Hi\r\n\r\nBody\r\n";

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

#[tokio::test]
async fn test_full_sync_session() {
    let mut script = Vec::new();
    script.extend_from_slice(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Dovecot ready.\r\n");
    script.extend_from_slice(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n");
    script.extend_from_slice(b"* 3 EXISTS\r\n* 0 RECENT\r\n");
    script.extend_from_slice(b"* OK [UIDVALIDITY 1700000000] UIDs valid\r\n");
    script.extend_from_slice(b"* OK [UIDNEXT 12] Predicted next UID\r\n");
    script.extend_from_slice(b"A0001 OK [READ-ONLY] Examine completed\r\n");
    script.extend_from_slice(b"* SEARCH 11 4 7\r\nA0002 OK Search completed\r\n");
    script.extend_from_slice(
        b"* 1 FETCH (UID 4 INTERNALDATE \"01-Mar-2024 10:00:00 +0000\" RFC822.SIZE 120 FLAGS (\\Seen))\r\n",
    );
    script.extend_from_slice(b"* 2 FETCH (UID 7 RFC822.SIZE 80 FLAGS ())\r\n");
    script.extend_from_slice(b"A0003 OK Fetch completed\r\n");
    script.extend_from_slice(
        format!("* 3 FETCH (UID 11 BODY[] {{{}}}\r\n", MESSAGE.len()).as_bytes(),
    );
    script.extend_from_slice(MESSAGE);
    script.extend_from_slice(b")\r\nA0004 OK Fetch completed\r\n");
    script.extend_from_slice(b"* BYE Logging out\r\nA0005 OK Logout completed\r\n");

    let (stream, sent) = MockStream::new(&script);
    let client = Client::from_stream(stream)
        .await
        .unwrap()
        .with_timeout(Duration::from_secs(5));
    assert!(client.has_capability(&Capability::Auth("PLAIN".to_string())));

    let client = client.login("alice", "s3cret pass").await.unwrap();
    assert!(client.has_capability(&Capability::Idle));

    let (mut client, status) = client.examine("INBOX").await.unwrap();
    assert_eq!(status.exists, 3);
    assert_eq!(status.uid_validity.unwrap().get(), 1_700_000_000);
    assert!(status.read_only);

    let uids = client.uid_search(&SearchCriteria::All).await.unwrap();
    let values: Vec<u32> = uids.iter().map(|u| u.get()).collect();
    assert_eq!(values, vec![4, 7, 11]);

    let summaries = client
        .uid_fetch(
            &UidSet::from_uids(uids[..2].iter().copied()),
            &[
                FetchAttribute::Uid,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
                FetchAttribute::Flags,
            ],
        )
        .await
        .unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries[0].1.contains(&FetchItem::Uid(4)));
    assert!(summaries[1].1.contains(&FetchItem::Flags(Vec::new())));

    let body = client
        .uid_fetch(
            &UidSet::single(Uid::new(11).unwrap()),
            &[FetchAttribute::Uid, FetchAttribute::BodyPeek],
        )
        .await
        .unwrap();
    assert_eq!(
        body[0].1[1],
        FetchItem::Body {
            section: String::new(),
            data: Some(MESSAGE.to_vec()),
        }
    );

    client.logout().await.unwrap();

    let text = sent_text(&sent);
    assert!(text.contains("A0000 LOGIN alice \"s3cret pass\"\r\n"));
    assert!(text.contains("A0001 EXAMINE INBOX\r\n"));
    assert!(text.contains("A0002 UID SEARCH ALL\r\n"));
    assert!(text.contains("A0003 UID FETCH 4,7 (UID INTERNALDATE RFC822.SIZE FLAGS)\r\n"));
    assert!(text.contains("A0004 UID FETCH 11 (UID BODY.PEEK[])\r\n"));
    assert!(text.ends_with("A0005 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_login_rejected_is_auth_error() {
    let script = b"* OK ready\r\nA0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n";
    let (stream, _) = MockStream::new(script);
    let client = Client::from_stream(stream).await.unwrap();
    let refused = client.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(refused.error, Error::Auth(text) if text == "Invalid credentials"));
}

#[tokio::test]
async fn test_rejected_login_can_still_log_out() {
    let mut script = Vec::new();
    script.extend_from_slice(b"* OK ready\r\n");
    script.extend_from_slice(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
    script.extend_from_slice(b"* BYE Logging out\r\nA0001 OK Logout completed\r\n");
    let (stream, sent) = MockStream::new(&script);
    let client = Client::from_stream(stream).await.unwrap();

    let refused = client.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(refused.error, Error::Auth(_)));
    refused.client.logout().await.unwrap();

    assert!(sent_text(&sent).ends_with("A0001 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_login_disabled_fails_without_sending() {
    let script = b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n";
    let (stream, sent) = MockStream::new(script);
    let client = Client::from_stream(stream).await.unwrap();
    let refused = client.login("alice", "pw").await.unwrap_err();
    assert!(matches!(refused.error, Error::Auth(_)));
    assert!(sent_text(&sent).is_empty());
}

#[tokio::test]
async fn test_bye_greeting_is_rejected() {
    let (stream, _) = MockStream::new(b"* BYE too many connections\r\n");
    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
}

#[tokio::test]
async fn test_examine_missing_mailbox_keeps_session() {
    let mut script = Vec::new();
    script.extend_from_slice(b"* OK ready\r\nA0000 OK done\r\n");
    script.extend_from_slice(b"A0001 NO Mailbox doesn't exist\r\n");
    script.extend_from_slice(b"A0002 OK Logout completed\r\n");
    let (stream, sent) = MockStream::new(&script);
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("alice", "pw").await.unwrap();

    let refused = client.examine("Nope").await.unwrap_err();
    assert!(matches!(refused.error, Error::No(_)));
    refused.client.logout().await.unwrap();

    assert!(sent_text(&sent).ends_with("A0002 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_connection_drop_mid_command_is_io() {
    let script = b"* OK ready\r\nA0000 OK done\r\n* 2 EXISTS\r\n";
    let (stream, _) = MockStream::new(script);
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("alice", "pw").await.unwrap();
    let refused = client.examine("INBOX").await.unwrap_err();
    assert!(matches!(refused.error, Error::Io(_)));
}

#[tokio::test]
async fn test_refusal_converts_into_error() {
    async fn open(client: Client<MockStream, NotAuthenticated>) -> Result<(), Error> {
        client.login("alice", "wrong").await?;
        Ok(())
    }

    let script = b"* OK ready\r\nA0000 NO Invalid credentials\r\n";
    let (stream, _) = MockStream::new(script);
    let client = Client::from_stream(stream).await.unwrap();
    assert!(matches!(open(client).await, Err(Error::Auth(_))));
}
