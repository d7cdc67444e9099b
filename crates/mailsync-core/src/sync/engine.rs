//! The per-account sync pass.
//!
//! A pass runs through these phases:
//!
//! ```text
//! Idle → Connecting → Listing → Selecting → FetchingAndPersisting → Finalizing → Idle
//!           └────────────┴──────────┴───────────→ Aborted
//! ```
//!
//! Connection, login and listing failures abort the pass. Failures on a
//! single message are counted and skipped. New messages are written in one
//! batch at the end, after which the account's checkpoint is advanced.
//!
//! The resume cursor only moves over a run of settled UIDs: a message that
//! may fetch or store fine next time holds the cursor just below it, so the
//! next incremental pass looks at it again.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use mailsync_imap::Uid;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::lock::AccountLocks;
use super::normalize::{NormalizeError, normalize};
use super::progress::{Progress, ProgressSink};
use super::source::{MailConnector, MailSession, RemoteMessageRef, SourceError};
use super::window::{SyncMode, WindowConfig, select_window};
use crate::account::{Account, AccountId, Vault};
use crate::message::{NewMessage, SyncCursor};
use crate::store::MailStore;

/// Where a pass is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Not running, or finished normally.
    #[default]
    Idle,
    /// Opening the session and logging in.
    Connecting,
    /// Listing the folder.
    Listing,
    /// Choosing the window and fetching summaries.
    Selecting,
    /// Fetching, normalizing and deduplicating messages.
    FetchingAndPersisting,
    /// Writing the batch and checkpoint.
    Finalizing,
    /// Stopped by an unrecoverable error.
    Aborted,
}

/// Why one message was not staged.
#[derive(Debug, Error)]
pub enum SkipReason {
    /// The server returned the invalid UID sentinel.
    #[error("invalid message identifier")]
    InvalidIdentifier,

    /// The message could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(SourceError),

    /// The message could not be decoded.
    #[error("{0}")]
    Decode(#[from] NormalizeError),

    /// The message is already stored or staged.
    #[error("already known")]
    AlreadyKnown,

    /// The dedup lookup failed.
    #[error("store lookup failed: {0}")]
    Store(crate::Error),
}

impl SkipReason {
    /// True if a later pass may succeed where this one did not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => !matches!(e, SourceError::Gone(_)),
            Self::Store(_) => true,
            Self::InvalidIdentifier | Self::Decode(_) | Self::AlreadyKnown => false,
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Account synced.
    pub account_id: AccountId,
    /// Mode of the pass.
    pub mode: SyncMode,
    /// Messages in the selected window.
    pub selected: usize,
    /// Messages persisted by this pass.
    pub new_messages: usize,
    /// Messages skipped because they were already stored.
    pub already_known: usize,
    /// Messages skipped because of an error.
    pub failed: usize,
    /// Final phase.
    pub phase: SyncPhase,
    /// Cause of an abort.
    pub aborted: Option<String>,
    /// True if the pass stopped early on request.
    pub cancelled: bool,
    /// True if another pass for the account was already running.
    pub busy: bool,
}

impl SyncReport {
    const fn new(account_id: AccountId, mode: SyncMode) -> Self {
        Self {
            account_id,
            mode,
            selected: 0,
            new_messages: 0,
            already_known: 0,
            failed: 0,
            phase: SyncPhase::Idle,
            aborted: None,
            cancelled: false,
            busy: false,
        }
    }

    /// True if the pass ran to the end.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.aborted.is_none() && !self.cancelled && !self.busy
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!(from = ?self.phase, to = ?phase, "Sync phase change");
        self.phase = phase;
    }

    fn abort(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(phase = ?self.phase, "Sync aborted: {reason}");
        self.phase = SyncPhase::Aborted;
        self.aborted = Some(reason);
        self
    }
}

/// Runs sync passes against one store and one kind of mail server.
#[derive(Debug)]
pub struct SyncEngine<S, C> {
    store: S,
    vault: Arc<Vault>,
    connector: C,
    window: WindowConfig,
    locks: AccountLocks,
}

impl<S, C> SyncEngine<S, C>
where
    S: MailStore,
    C: MailConnector,
{
    /// Creates an engine with its own lock table.
    #[must_use]
    pub fn new(store: S, vault: Arc<Vault>, connector: C, window: WindowConfig) -> Self {
        Self {
            store,
            vault,
            connector,
            window,
            locks: AccountLocks::new(),
        }
    }

    /// Shares a lock table with other engines over the same store.
    #[must_use]
    pub fn with_locks(mut self, locks: AccountLocks) -> Self {
        self.locks = locks;
        self
    }

    /// The store passes write to.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The connector passes use.
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs one pass for an account.
    ///
    /// Never fails: expected errors are logged and reflected in the report.
    pub async fn sync_account(
        &self,
        account_id: AccountId,
        mode: SyncMode,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let span = info_span!("sync", account_id = %account_id, mode = %mode);
        self.run(account_id, mode, progress, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        account_id: AccountId,
        mode: SyncMode,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let mut report = SyncReport::new(account_id, mode);

        let Some(_guard) = self.locks.try_acquire(account_id) else {
            warn!("A sync pass is already running for this account");
            report.busy = true;
            return report;
        };

        let account = match self.store.find_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return report.abort(format!("account {account_id} not found")),
            Err(e) => return report.abort(e.to_string()),
        };
        let password = self.vault.reveal(&account.protected_password);

        report.enter(SyncPhase::Connecting);
        let mut session = match self.connector.connect(&account.endpoint).await {
            Ok(session) => session,
            Err(e) => return report.abort(e.to_string()),
        };

        let outcome = self
            .run_session(&mut session, &account, &password, progress, cancel, &mut report)
            .await;
        session.disconnect().await;

        match outcome {
            Ok(()) => {
                info!(
                    new = report.new_messages,
                    known = report.already_known,
                    failed = report.failed,
                    cancelled = report.cancelled,
                    "Sync pass finished"
                );
                report
            }
            Err(e) => report.abort(e.to_string()),
        }
    }

    async fn run_session(
        &self,
        session: &mut C::Session,
        account: &Account,
        password: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> crate::Result<()> {
        session.authenticate(&account.email, password).await?;

        report.enter(SyncPhase::Listing);
        let listing = session.list_all().await?;
        debug!(count = listing.ids.len(), "Listed folder");

        if listing.ids.is_empty() {
            info!("Folder is empty");
            report.enter(SyncPhase::Idle);
            return Ok(());
        }

        report.enter(SyncPhase::Selecting);
        let cursor = self.store.load_cursor(account.id).await?;
        let window = select_window(&listing, report.mode, cursor, &self.window);
        report.selected = window.len();
        if window.is_empty() {
            info!("No new messages");
            report.enter(SyncPhase::Finalizing);
            self.store
                .update_account_checkpoint(account.id, Utc::now())
                .await?;
            report.enter(SyncPhase::Idle);
            return Ok(());
        }

        let mut summaries = session.fetch_summaries(&window).await?;
        summaries.sort_by_key(|summary| summary.raw_uid);

        report.enter(SyncPhase::FetchingAndPersisting);
        let total = summaries.len();
        progress.report(Progress::new(
            0,
            total,
            format!("Found {total} messages to process"),
        ));

        let mut staged: Vec<NewMessage> = Vec::new();
        let mut staged_ids: HashSet<String> = HashSet::new();
        let mut settled: Option<Uid> = None;
        let mut held_back = false;
        let mut connection_lost = None;

        for (index, summary) in summaries.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = index, total, "Sync cancelled");
                report.cancelled = true;
                break;
            }

            let outcome = self.process_one(session, account.id, summary, &staged_ids).await;
            if outcome.as_ref().is_err_and(SkipReason::is_retryable) {
                held_back = true;
            } else if !held_back {
                settled = settled.max(summary.uid());
            }

            match outcome {
                Ok(message) => {
                    progress.report(Progress::new(
                        staged.len() + 1,
                        total,
                        format!("Processing message {}/{total}: {}", index + 1, message.subject),
                    ));
                    staged_ids.insert(message.message_id.clone());
                    staged.push(message);
                }
                Err(SkipReason::AlreadyKnown) => {
                    debug!(uid = summary.raw_uid, "Message already stored");
                    report.already_known += 1;
                }
                Err(SkipReason::Fetch(e @ SourceError::Transport(_))) => {
                    warn!(uid = summary.raw_uid, "Connection lost while fetching: {e}");
                    report.failed += 1;
                    connection_lost = Some(e);
                    break;
                }
                Err(reason) => {
                    warn!(uid = summary.raw_uid, "Skipping message: {reason}");
                    report.failed += 1;
                }
            }
        }

        report.enter(SyncPhase::Finalizing);
        report.new_messages = self.store.insert_messages(account.id, &staged).await?;

        if let (Some(uid_validity), Some(last)) = (listing.uid_validity, settled) {
            let cursor = SyncCursor {
                uid_validity,
                last_uid: last.get(),
            };
            self.store.save_cursor(account.id, cursor).await?;
        }

        if let Some(e) = connection_lost {
            return Err(e.into());
        }

        if !report.cancelled {
            self.store
                .update_account_checkpoint(account.id, Utc::now())
                .await?;
        }

        report.enter(SyncPhase::Idle);
        Ok(())
    }

    /// Fetches, normalizes and dedups one message.
    async fn process_one(
        &self,
        session: &mut C::Session,
        account_id: AccountId,
        summary: &RemoteMessageRef,
        staged_ids: &HashSet<String>,
    ) -> Result<NewMessage, SkipReason> {
        let uid = summary.uid().ok_or(SkipReason::InvalidIdentifier)?;
        let raw = session
            .fetch_full_message(uid)
            .await
            .map_err(SkipReason::Fetch)?;
        let message = normalize(&raw, Some(summary))?;

        if staged_ids.contains(&message.message_id) {
            return Err(SkipReason::AlreadyKnown);
        }
        let known = self
            .store
            .find_existing_message(account_id, &message.message_id, &message.composite_key())
            .await
            .map_err(SkipReason::Store)?;
        if known {
            return Err(SkipReason::AlreadyKnown);
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_skips() {
        let unavailable = SourceError::Protocol("NO [UNAVAILABLE]".to_string());
        assert!(SkipReason::Fetch(unavailable).is_retryable());
        assert!(SkipReason::Fetch(SourceError::Transport("reset".to_string())).is_retryable());
        assert!(SkipReason::Store(crate::Error::Config("locked".to_string())).is_retryable());

        assert!(!SkipReason::Fetch(SourceError::Gone(7)).is_retryable());
        assert!(!SkipReason::InvalidIdentifier.is_retryable());
        assert!(!SkipReason::AlreadyKnown.is_retryable());
    }
}
