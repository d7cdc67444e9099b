//! Sync engine tests against an in-memory mailbox and an in-memory store.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailsync_core::account::{Account, Vault};
use mailsync_core::message::{CompositeKey, MessageQuery, NewMessage, ReadFilter, SyncCursor};
use mailsync_core::sync::{
    AccountLocks, FolderListing, MailConnector, MailSession, NoProgress, Progress, RawMessage,
    RemoteMessageRef, SourceError, SyncEngine, SyncMode, SyncPhase, WindowConfig,
};
use mailsync_core::{AccountId, Database, Endpoint, MailStore, NewAccount, Security, SqliteStore};
use mailsync_imap::Uid;
use tokio_util::sync::CancellationToken;

const PASSWORD: &str = "correct horse";

#[derive(Default)]
struct MailboxState {
    uid_validity: Option<u32>,
    messages: BTreeMap<u32, Vec<u8>>,
    failures: HashMap<u32, SourceError>,
    send_sentinel: bool,
    refuse_connect: bool,
    fetched: Vec<u32>,
    disconnects: usize,
}

/// A mailbox shared between the test and the sessions it hands out.
#[derive(Clone, Default)]
struct Mailbox(Arc<Mutex<MailboxState>>);

impl Mailbox {
    fn with_messages(count: u32) -> Self {
        let mailbox = Self::default();
        {
            let mut state = mailbox.0.lock().unwrap();
            state.uid_validity = Some(1);
            for uid in 1..=count {
                state.messages.insert(uid, message(uid));
            }
        }
        mailbox
    }

    fn add(&self, uid: u32, bytes: Vec<u8>) {
        self.0.lock().unwrap().messages.insert(uid, bytes);
    }

    fn fail(&self, uid: u32, error: SourceError) {
        self.0.lock().unwrap().failures.insert(uid, error);
    }

    fn recover(&self, uid: u32) {
        self.0.lock().unwrap().failures.remove(&uid);
    }

    fn state<T>(&self, f: impl FnOnce(&mut MailboxState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }
}

fn message(uid: u32) -> Vec<u8> {
    format!(
        "From: sender{uid}@example.com\r\n\
To: me@example.com\r\n\
Subject: Message {uid}\r\n\
Message-ID: <{uid}@example.com>\r\n\
Date: Mon, 01 Jan 2024 00:00:00 +0000\r\n\
\r\n\
Body of message {uid}\r\n"
    )
    .into_bytes()
}

fn anonymous(body: &str) -> Vec<u8> {
    format!(
        "From: same@example.com\r\n\
Subject: Same\r\n\
Date: Mon, 01 Jan 2024 00:00:00 +0000\r\n\
\r\n\
{body}\r\n"
    )
    .into_bytes()
}

struct FixtureConnector {
    mailbox: Mailbox,
}

impl MailConnector for FixtureConnector {
    type Session = FixtureSession;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<FixtureSession, SourceError> {
        if self.mailbox.state(|s| s.refuse_connect) {
            return Err(SourceError::Transport("connection refused".to_string()));
        }
        Ok(FixtureSession {
            mailbox: self.mailbox.clone(),
            logged_in: false,
        })
    }
}

struct FixtureSession {
    mailbox: Mailbox,
    logged_in: bool,
}

impl MailSession for FixtureSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), SourceError> {
        if username != "me@example.com" || password != PASSWORD {
            return Err(SourceError::Auth("invalid credentials".to_string()));
        }
        self.logged_in = true;
        Ok(())
    }

    async fn list_all(&mut self) -> Result<FolderListing, SourceError> {
        assert!(self.logged_in);
        Ok(self.mailbox.state(|s| FolderListing {
            uid_validity: s.uid_validity,
            ids: s.messages.keys().filter_map(|&uid| Uid::new(uid)).collect(),
        }))
    }

    async fn fetch_summaries(&mut self, ids: &[Uid]) -> Result<Vec<RemoteMessageRef>, SourceError> {
        let send_sentinel = self.mailbox.state(|s| s.send_sentinel);
        let mut refs: Vec<RemoteMessageRef> = ids
            .iter()
            .rev()
            .map(|uid| RemoteMessageRef {
                raw_uid: uid.get(),
                internal_date: None,
                size: None,
                seen: true,
            })
            .collect();
        if send_sentinel {
            refs.push(RemoteMessageRef {
                raw_uid: 0,
                internal_date: None,
                size: None,
                seen: false,
            });
        }
        Ok(refs)
    }

    async fn fetch_full_message(&mut self, id: Uid) -> Result<RawMessage, SourceError> {
        self.mailbox.state(|s| {
            s.fetched.push(id.get());
            if let Some(error) = s.failures.get(&id.get()) {
                return Err(error.clone());
            }
            s.messages
                .get(&id.get())
                .map(|bytes| RawMessage {
                    uid: id,
                    bytes: bytes.clone(),
                })
                .ok_or(SourceError::Gone(id.get()))
        })
    }

    async fn disconnect(self) {
        self.mailbox.state(|s| s.disconnects += 1);
    }
}

struct Harness {
    db: Database,
    engine: SyncEngine<SqliteStore, FixtureConnector>,
    account_id: AccountId,
    mailbox: Mailbox,
}

async fn harness(mailbox: Mailbox) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let vault = Vault::new("integration-test-key");
    let account = db
        .accounts()
        .insert(
            &NewAccount::new("Me", "me@example.com", "imap.example.com", Security::Tls),
            &vault.protect(PASSWORD),
        )
        .await
        .unwrap();

    let engine = SyncEngine::new(
        db.store(),
        Arc::new(vault),
        FixtureConnector {
            mailbox: mailbox.clone(),
        },
        WindowConfig::default(),
    );

    Harness {
        db,
        engine,
        account_id: account.id,
        mailbox,
    }
}

impl Harness {
    async fn sync(&self, mode: SyncMode) -> mailsync_core::SyncReport {
        self.engine
            .sync_account(self.account_id, mode, &NoProgress, &CancellationToken::new())
            .await
    }

    async fn stored(&self) -> u64 {
        self.db
            .messages()
            .count(Some(self.account_id), ReadFilter::All)
            .await
            .unwrap()
    }

    async fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.db
            .accounts()
            .get(self.account_id)
            .await
            .unwrap()
            .unwrap()
            .last_sync
    }

    async fn last_sync_set(&self) -> bool {
        self.last_sync().await.is_some()
    }

    async fn cursor(&self) -> Option<u32> {
        self.db
            .messages()
            .load_cursor(self.account_id)
            .await
            .unwrap()
            .map(|c| c.last_uid)
    }
}

/// Store whose dedup lookups fail for chosen message ids.
#[derive(Clone)]
struct FlakyStore {
    inner: SqliteStore,
    broken: Arc<Mutex<HashSet<String>>>,
}

impl FlakyStore {
    fn break_lookup(&self, message_id: &str) {
        self.broken.lock().unwrap().insert(message_id.to_string());
    }

    fn repair(&self) {
        self.broken.lock().unwrap().clear();
    }
}

impl MailStore for FlakyStore {
    async fn find_account(&self, id: AccountId) -> mailsync_core::Result<Option<Account>> {
        self.inner.find_account(id).await
    }

    async fn find_existing_message(
        &self,
        account_id: AccountId,
        message_id: &str,
        key: &CompositeKey,
    ) -> mailsync_core::Result<bool> {
        if self.broken.lock().unwrap().contains(message_id) {
            return Err(std::io::Error::other("disk I/O error").into());
        }
        self.inner
            .find_existing_message(account_id, message_id, key)
            .await
    }

    async fn insert_messages(
        &self,
        account_id: AccountId,
        batch: &[NewMessage],
    ) -> mailsync_core::Result<usize> {
        self.inner.insert_messages(account_id, batch).await
    }

    async fn update_account_checkpoint(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> mailsync_core::Result<bool> {
        self.inner.update_account_checkpoint(account_id, at).await
    }

    async fn load_cursor(
        &self,
        account_id: AccountId,
    ) -> mailsync_core::Result<Option<SyncCursor>> {
        self.inner.load_cursor(account_id).await
    }

    async fn save_cursor(
        &self,
        account_id: AccountId,
        cursor: SyncCursor,
    ) -> mailsync_core::Result<()> {
        self.inner.save_cursor(account_id, cursor).await
    }
}

#[tokio::test]
async fn test_full_sync_then_nothing_new() {
    let h = harness(Mailbox::with_messages(3)).await;

    let first = h.sync(SyncMode::Full).await;
    assert_eq!(first.new_messages, 3);
    assert_eq!(first.phase, SyncPhase::Idle);
    assert!(first.is_complete());
    assert!(h.last_sync_set().await);
    assert_eq!(h.stored().await, 3);

    let second = h.sync(SyncMode::Full).await;
    assert_eq!(second.new_messages, 0);
    assert_eq!(second.already_known, 3);
    assert_eq!(h.stored().await, 3);
    assert_eq!(h.mailbox.state(|s| s.disconnects), 2);
}

#[tokio::test]
async fn test_stored_records_are_normalized() {
    let h = harness(Mailbox::with_messages(2)).await;
    h.sync(SyncMode::Full).await;

    let page = h
        .db
        .messages()
        .list(&MessageQuery {
            account_id: Some(h.account_id),
            ..MessageQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    let record = page.iter().find(|m| m.message_id == "1@example.com").unwrap();
    assert_eq!(record.from, "sender1@example.com");
    assert_eq!(record.subject, "Message 1");
    assert_eq!(record.snippet, "Body of message 1\r\n");
    assert!(!record.is_read);
    assert!(!record.synthetic_id);
}

#[tokio::test]
async fn test_single_message_failure_is_isolated() {
    let mailbox = Mailbox::with_messages(5);
    mailbox.fail(3, SourceError::Protocol("message expunged".to_string()));
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Full).await;
    assert_eq!(report.new_messages, 4);
    assert_eq!(report.failed, 1);
    assert!(report.aborted.is_none());
    assert!(h.last_sync_set().await);
    assert_eq!(h.mailbox.state(|s| s.fetched.clone()), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_undecodable_message_is_skipped() {
    let mailbox = Mailbox::with_messages(2);
    mailbox.add(3, b"   ".to_vec());
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Full).await;
    assert_eq!(report.new_messages, 2);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_sentinel_summary_is_skipped() {
    let mailbox = Mailbox::with_messages(3);
    mailbox.state(|s| s.send_sentinel = true);
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Full).await;
    assert_eq!(report.new_messages, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(h.mailbox.state(|s| s.fetched.len()), 3);
}

#[tokio::test]
async fn test_window_bounds_on_large_mailbox() {
    let h = harness(Mailbox::with_messages(5000)).await;

    let report = h.sync(SyncMode::Full).await;
    assert_eq!(report.selected, 1000);
    assert_eq!(report.new_messages, 1000);
    let fetched = h.mailbox.state(|s| s.fetched.clone());
    assert_eq!(fetched.first(), Some(&4001));
    assert_eq!(fetched.last(), Some(&5000));

    let h = harness(Mailbox::with_messages(5000)).await;
    let report = h.sync(SyncMode::Incremental).await;
    assert_eq!(report.selected, 50);
    assert_eq!(report.new_messages, 50);
}

#[tokio::test]
async fn test_incremental_resumes_from_cursor() {
    let h = harness(Mailbox::with_messages(120)).await;

    let first = h.sync(SyncMode::Incremental).await;
    assert_eq!(first.new_messages, 50);

    for uid in 121..=123 {
        h.mailbox.add(uid, message(uid));
    }
    let second = h.sync(SyncMode::Incremental).await;
    assert_eq!(second.selected, 3);
    assert_eq!(second.new_messages, 3);

    let before = h.last_sync().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let third = h.sync(SyncMode::Incremental).await;
    assert_eq!(third.selected, 0);
    assert_eq!(third.new_messages, 0);
    assert!(third.is_complete());
    assert!(h.last_sync().await > before);

    assert_eq!(h.cursor().await, Some(123));
}

#[tokio::test]
async fn test_caught_up_pass_advances_checkpoint() {
    let h = harness(Mailbox::with_messages(3)).await;
    h.sync(SyncMode::Incremental).await;
    let before = h.last_sync().await;
    assert!(before.is_some());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let report = h.sync(SyncMode::Incremental).await;
    assert_eq!(report.selected, 0);
    assert!(report.is_complete());
    assert!(h.last_sync().await > before);
    assert_eq!(h.mailbox.state(|s| s.disconnects), 2);
}

#[tokio::test]
async fn test_empty_folder_leaves_checkpoint() {
    let mailbox = Mailbox::default();
    mailbox.state(|s| s.uid_validity = Some(1));
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Incremental).await;
    assert_eq!(report.selected, 0);
    assert!(report.is_complete());
    assert!(!h.last_sync_set().await);
    assert_eq!(h.cursor().await, None);
}

#[tokio::test]
async fn test_failed_fetch_is_retried_by_next_pass() {
    let mailbox = Mailbox::with_messages(5);
    mailbox.fail(3, SourceError::Protocol("NO [UNAVAILABLE]".to_string()));
    let h = harness(mailbox).await;

    let first = h.sync(SyncMode::Incremental).await;
    assert_eq!(first.new_messages, 4);
    assert_eq!(first.failed, 1);
    assert_eq!(h.cursor().await, Some(2));

    h.mailbox.recover(3);
    let second = h.sync(SyncMode::Incremental).await;
    assert_eq!(second.selected, 3);
    assert_eq!(second.new_messages, 1);
    assert_eq!(second.already_known, 2);
    assert_eq!(h.stored().await, 5);
    assert_eq!(h.cursor().await, Some(5));

    let third = h.sync(SyncMode::Incremental).await;
    assert_eq!(third.selected, 0);
    assert_eq!(h.stored().await, 5);
}

#[tokio::test]
async fn test_expunged_message_does_not_hold_cursor() {
    let mailbox = Mailbox::with_messages(5);
    mailbox.fail(3, SourceError::Gone(3));
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Incremental).await;
    assert_eq!(report.new_messages, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(h.cursor().await, Some(5));
}

#[tokio::test]
async fn test_failed_lookup_is_retried_by_next_pass() {
    let h = harness(Mailbox::with_messages(4)).await;
    let store = FlakyStore {
        inner: h.db.store(),
        broken: Arc::default(),
    };
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(Vault::new("integration-test-key")),
        FixtureConnector {
            mailbox: h.mailbox.clone(),
        },
        WindowConfig::default(),
    );
    let cancel = CancellationToken::new();
    let sync = || {
        engine.sync_account(h.account_id, SyncMode::Incremental, &NoProgress, &cancel)
    };

    store.break_lookup("2@example.com");
    let first = sync().await;
    assert_eq!(first.new_messages, 3);
    assert_eq!(first.failed, 1);
    assert!(first.is_complete());
    assert_eq!(h.cursor().await, Some(1));

    store.repair();
    let second = sync().await;
    assert_eq!(second.selected, 3);
    assert_eq!(second.new_messages, 1);
    assert_eq!(h.stored().await, 4);
    assert_eq!(h.cursor().await, Some(4));
}

#[tokio::test]
async fn test_new_uid_validity_falls_back_to_newest() {
    let h = harness(Mailbox::with_messages(60)).await;
    h.sync(SyncMode::Incremental).await;

    h.mailbox.state(|s| s.uid_validity = Some(2));
    let report = h.sync(SyncMode::Incremental).await;
    assert_eq!(report.selected, 50);
    assert_eq!(report.new_messages, 0);
    assert_eq!(report.already_known, 50);
}

#[tokio::test]
async fn test_synthetic_ids_fall_back_to_composite_key() {
    let mailbox = Mailbox::default();
    mailbox.state(|s| s.uid_validity = Some(1));
    mailbox.add(1, anonymous("first body"));
    mailbox.add(2, anonymous("second body"));
    let h = harness(mailbox).await;

    let first = h.sync(SyncMode::Full).await;
    assert_eq!(first.new_messages, 2);

    let second = h.sync(SyncMode::Full).await;
    assert_eq!(second.new_messages, 0);
    assert_eq!(second.already_known, 2);
    assert_eq!(h.stored().await, 2);
}

#[tokio::test]
async fn test_progress_is_reported_in_order() {
    let h = harness(Mailbox::with_messages(4)).await;
    let seen = Mutex::new(Vec::new());
    let sink = |p: Progress| seen.lock().unwrap().push(p);

    h.engine
        .sync_account(h.account_id, SyncMode::Full, &sink, &CancellationToken::new())
        .await;

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[0].current, 0);
    assert_eq!(seen[0].total, 4);
    assert_eq!(seen[0].status, "Found 4 messages to process");
    assert_eq!(seen[1].status, "Processing message 1/4: Message 1");
    assert!(seen.windows(2).all(|pair| pair[0].current < pair[1].current));
}

#[tokio::test]
async fn test_cancellation_keeps_staged_work() {
    let h = harness(Mailbox::with_messages(5)).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = move |p: Progress| {
        if p.current == 2 {
            trigger.cancel();
        }
    };

    let report = h
        .engine
        .sync_account(h.account_id, SyncMode::Full, &sink, &cancel)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.new_messages, 2);
    assert_eq!(h.stored().await, 2);
    assert!(!h.last_sync_set().await);
    assert_eq!(h.mailbox.state(|s| s.disconnects), 1);
    assert_eq!(h.cursor().await, Some(2));
}

#[tokio::test]
async fn test_busy_account_is_refused() {
    let h = harness(Mailbox::with_messages(3)).await;
    let locks = AccountLocks::new();
    let engine = SyncEngine::new(
        h.db.store(),
        Arc::new(Vault::new("integration-test-key")),
        FixtureConnector {
            mailbox: h.mailbox.clone(),
        },
        WindowConfig::default(),
    )
    .with_locks(locks.clone());

    let guard = locks.try_acquire(h.account_id).unwrap();
    let report = engine
        .sync_account(h.account_id, SyncMode::Full, &NoProgress, &CancellationToken::new())
        .await;
    assert!(report.busy);
    assert_eq!(report.new_messages, 0);
    assert_eq!(h.mailbox.state(|s| s.disconnects), 0);

    drop(guard);
    let report = engine
        .sync_account(h.account_id, SyncMode::Full, &NoProgress, &CancellationToken::new())
        .await;
    assert_eq!(report.new_messages, 3);
}

#[tokio::test]
async fn test_wrong_password_aborts() {
    let h = harness(Mailbox::with_messages(3)).await;
    h.db
        .accounts()
        .update(
            h.account_id,
            &NewAccount::new("Me", "me@example.com", "imap.example.com", Security::Tls),
            Some(&Vault::new("integration-test-key").protect("wrong")),
        )
        .await
        .unwrap();

    let report = h.sync(SyncMode::Full).await;
    assert_eq!(report.phase, SyncPhase::Aborted);
    assert_eq!(report.new_messages, 0);
    assert!(report.aborted.unwrap().contains("Authentication failed"));
    assert!(!h.last_sync_set().await);
    assert_eq!(h.mailbox.state(|s| s.disconnects), 1);
}

#[tokio::test]
async fn test_connect_failure_aborts() {
    let mailbox = Mailbox::with_messages(3);
    mailbox.state(|s| s.refuse_connect = true);
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Incremental).await;
    assert_eq!(report.phase, SyncPhase::Aborted);
    assert_eq!(report.new_messages, 0);
    assert_eq!(h.stored().await, 0);
}

#[tokio::test]
async fn test_connection_lost_mid_pass_keeps_earlier_messages() {
    let mailbox = Mailbox::with_messages(5);
    mailbox.fail(3, SourceError::Transport("connection reset".to_string()));
    let h = harness(mailbox).await;

    let report = h.sync(SyncMode::Full).await;
    assert_eq!(report.new_messages, 2);
    assert_eq!(report.phase, SyncPhase::Aborted);
    assert_eq!(h.stored().await, 2);
    assert!(!h.last_sync_set().await);
    assert_eq!(h.mailbox.state(|s| s.fetched.clone()), vec![1, 2, 3]);
    assert_eq!(h.cursor().await, Some(2));
}

#[tokio::test]
async fn test_missing_account_returns_zero() {
    let h = harness(Mailbox::with_messages(1)).await;
    let report = h
        .engine
        .sync_account(AccountId(999), SyncMode::Full, &NoProgress, &CancellationToken::new())
        .await;
    assert_eq!(report.new_messages, 0);
    assert_eq!(report.phase, SyncPhase::Aborted);
    assert_eq!(h.mailbox.state(|s| s.disconnects), 0);
}
