//! [`MailConnector`] backed by the `mailsync-imap` client.

use std::time::Duration;

use mailsync_imap::{
    Authenticated, Client, Config, FetchAttribute, FetchItem, ImapStream, NotAuthenticated,
    SearchCriteria, Selected, Timeouts, Uid, UidSet,
};
use mailsync_mime::parse_internal_date;
use tracing::{debug, warn};

use super::source::{
    FolderListing, MailConnector, MailSession, RawMessage, RemoteMessageRef, SourceError,
};
use crate::account::{Endpoint, Security};

/// Folder every pass syncs.
const INBOX: &str = "INBOX";

/// Opens IMAP sessions with bounded connect and command times.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector {
    timeouts: Timeouts,
}

impl ImapConnector {
    /// Creates a connector with the given timeouts.
    #[must_use]
    pub const fn new(connect: Duration, io: Duration) -> Self {
        Self {
            timeouts: Timeouts { connect, io },
        }
    }
}

const fn imap_security(security: Security) -> mailsync_imap::Security {
    match security {
        Security::None => mailsync_imap::Security::None,
        Security::Tls => mailsync_imap::Security::Implicit,
        Security::StartTls => mailsync_imap::Security::StartTls,
    }
}

impl MailConnector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<ImapSession, SourceError> {
        let config = Config::new(endpoint.host.as_str(), imap_security(endpoint.security))
            .with_port(endpoint.port)
            .with_timeouts(self.timeouts);

        let io = self.timeouts.io;
        let stream = mailsync_imap::connection::connect(&config).await?;
        let greeting = tokio::time::timeout(io, Client::from_stream(stream))
            .await
            .map_err(|_| mailsync_imap::Error::Timeout(io))??;
        let mut client = greeting.with_timeout(io);

        if endpoint.security == Security::StartTls {
            client = client.starttls(&endpoint.host).await?;
        }

        debug!(host = %endpoint.host, port = endpoint.port, "IMAP connection established");
        Ok(ImapSession {
            state: SessionState::Connected(client),
        })
    }
}

enum SessionState {
    Connected(Client<ImapStream, NotAuthenticated>),
    Authenticated(Client<ImapStream, Authenticated>),
    Selected(Client<ImapStream, Selected>),
    Closed,
}

/// A live IMAP session.
pub struct ImapSession {
    state: SessionState,
}

impl std::fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            SessionState::Connected(_) => "connected",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Selected(_) => "selected",
            SessionState::Closed => "closed",
        };
        f.debug_struct("ImapSession").field("state", &state).finish()
    }
}

impl ImapSession {
    fn selected(&mut self) -> Result<&mut Client<ImapStream, Selected>, SourceError> {
        match &mut self.state {
            SessionState::Selected(client) => Ok(client),
            _ => Err(SourceError::Protocol("no folder selected".to_string())),
        }
    }
}

impl MailSession for ImapSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), SourceError> {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Connected(client) = state else {
            self.state = state;
            return Err(SourceError::Protocol("session already authenticated".to_string()));
        };

        match client.login(username, password).await {
            Ok(client) => {
                self.state = SessionState::Authenticated(client);
                Ok(())
            }
            Err(refused) => {
                self.state = SessionState::Connected(refused.client);
                Err(refused.error.into())
            }
        }
    }

    async fn list_all(&mut self) -> Result<FolderListing, SourceError> {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Authenticated(client) = state else {
            self.state = state;
            return Err(SourceError::Protocol("session not authenticated".to_string()));
        };

        let (mut client, status) = match client.examine(INBOX).await {
            Ok(opened) => opened,
            Err(refused) => {
                self.state = SessionState::Authenticated(refused.client);
                return Err(refused.error.into());
            }
        };
        debug!(exists = status.exists, "Opened {INBOX} read-only");
        let ids = client.uid_search(&SearchCriteria::All).await;
        self.state = SessionState::Selected(client);

        Ok(FolderListing {
            uid_validity: status.uid_validity.map(|v| v.get()),
            ids: ids?,
        })
    }

    async fn fetch_summaries(&mut self, ids: &[Uid]) -> Result<Vec<RemoteMessageRef>, SourceError> {
        let client = self.selected()?;
        let fetched = client
            .uid_fetch(
                &UidSet::from_uids(ids.iter().copied()),
                &[
                    FetchAttribute::Uid,
                    FetchAttribute::InternalDate,
                    FetchAttribute::Rfc822Size,
                    FetchAttribute::Flags,
                ],
            )
            .await?;

        Ok(fetched
            .into_iter()
            .map(|(_, items)| summary_from_items(items))
            .collect())
    }

    async fn fetch_full_message(&mut self, id: Uid) -> Result<RawMessage, SourceError> {
        let client = self.selected()?;
        let fetched = client
            .uid_fetch(
                &UidSet::single(id),
                &[FetchAttribute::Uid, FetchAttribute::BodyPeek],
            )
            .await?;

        fetched
            .into_iter()
            .flat_map(|(_, items)| items)
            .find_map(|item| match item {
                FetchItem::Body {
                    section,
                    data: Some(bytes),
                } if section.is_empty() => Some(bytes),
                _ => None,
            })
            .map(|bytes| RawMessage { uid: id, bytes })
            .ok_or(SourceError::Gone(id.get()))
    }

    async fn disconnect(self) {
        let result = match self.state {
            SessionState::Connected(client) => client.logout().await,
            SessionState::Authenticated(client) => client.logout().await,
            SessionState::Selected(client) => client.logout().await,
            SessionState::Closed => Ok(()),
        };
        if let Err(e) = result {
            warn!("IMAP logout failed: {e}");
        }
    }
}

fn summary_from_items(items: Vec<FetchItem>) -> RemoteMessageRef {
    let mut summary = RemoteMessageRef {
        raw_uid: 0,
        internal_date: None,
        size: None,
        seen: false,
    };

    for item in items {
        match item {
            FetchItem::Uid(uid) => summary.raw_uid = uid,
            FetchItem::InternalDate(date) => summary.internal_date = parse_internal_date(&date),
            FetchItem::Rfc822Size(size) => summary.size = Some(size),
            FetchItem::Flags(flags) => {
                summary.seen = flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen"));
            }
            FetchItem::Body { .. } => {}
        }
    }

    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves one connection: greets, then answers each tagged command with
    /// the next reply. Returns the command lines received.
    async fn scripted_server(
        replies: &'static [&'static str],
    ) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"* OK ready\r\n").await.unwrap();

            let mut received = Vec::new();
            for reply in replies {
                let Some(line) = lines.next_line().await.unwrap() else {
                    break;
                };
                let tag = line.split(' ').next().unwrap_or_default().to_string();
                received.push(line);
                write
                    .write_all(format!("{tag} {reply}\r\n").as_bytes())
                    .await
                    .unwrap();
            }
            received
        });
        (port, server)
    }

    fn local(port: u16) -> Endpoint {
        Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            security: Security::None,
        }
    }

    #[test]
    fn test_summary_from_items() {
        let summary = summary_from_items(vec![
            FetchItem::Uid(42),
            FetchItem::InternalDate("01-Mar-2024 10:00:00 +0000".to_string()),
            FetchItem::Rfc822Size(512),
            FetchItem::Flags(vec!["\\seen".to_string(), "\\Flagged".to_string()]),
        ]);
        assert_eq!(summary.uid().unwrap().get(), 42);
        assert_eq!(
            summary.internal_date.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
        assert_eq!(summary.size, Some(512));
        assert!(summary.seen);
    }

    #[test]
    fn test_summary_without_uid_is_sentinel() {
        let summary = summary_from_items(vec![FetchItem::Flags(Vec::new())]);
        assert!(summary.uid().is_none());
        assert!(!summary.seen);
    }

    #[test]
    fn test_security_mapping() {
        assert_eq!(
            imap_security(Security::Tls),
            mailsync_imap::Security::Implicit
        );
        assert_eq!(
            imap_security(Security::StartTls),
            mailsync_imap::Security::StartTls
        );
        assert_eq!(imap_security(Security::None), mailsync_imap::Security::None);
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport() {
        let connector = ImapConnector::new(Duration::from_secs(2), Duration::from_secs(2));
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: 1,
            security: Security::None,
        };
        let err = connector.connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_rejected_login_still_logs_out() {
        let (port, server) =
            scripted_server(&["NO [AUTHENTICATIONFAILED] Invalid credentials", "OK bye"]).await;
        let connector = ImapConnector::new(Duration::from_secs(5), Duration::from_secs(5));

        let mut session = connector.connect(&local(port)).await.unwrap();
        let err = session.authenticate("me", "wrong").await.unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)));
        session.disconnect().await;

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        assert!(received[0].contains("LOGIN"));
        assert!(received[1].ends_with("LOGOUT"));
    }

    #[tokio::test]
    async fn test_failed_examine_still_logs_out() {
        let (port, server) =
            scripted_server(&["OK logged in", "NO Mailbox unavailable", "OK bye"]).await;
        let connector = ImapConnector::new(Duration::from_secs(5), Duration::from_secs(5));

        let mut session = connector.connect(&local(port)).await.unwrap();
        session.authenticate("me", "pw").await.unwrap();
        let err = session.list_all().await.unwrap_err();
        assert!(matches!(err, SourceError::Protocol(_)));
        session.disconnect().await;

        let received = server.await.unwrap();
        assert!(received[1].ends_with("EXAMINE INBOX"));
        assert!(received[2].ends_with("LOGOUT"));
    }
}
