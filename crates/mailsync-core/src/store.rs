//! Local store used by the sync engine.

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::Result;
use crate::account::{Account, AccountId, AccountRepository};
use crate::message::{CompositeKey, MessageRepository, NewMessage, SyncCursor};

/// Storage operations a sync pass needs.
pub trait MailStore: Send + Sync {
    /// Looks up an account.
    fn find_account(
        &self,
        id: AccountId,
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// True if the account already has a message with this id or this
    /// sender, subject and received time.
    fn find_existing_message(
        &self,
        account_id: AccountId,
        message_id: &str,
        key: &CompositeKey,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Persists a batch in one transaction and returns how many rows were
    /// inserted.
    fn insert_messages(
        &self,
        account_id: AccountId,
        batch: &[NewMessage],
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Records a completed pass.
    fn update_account_checkpoint(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Loads the account's resume position.
    fn load_cursor(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Option<SyncCursor>>> + Send;

    /// Stores the account's resume position.
    fn save_cursor(
        &self,
        account_id: AccountId,
        cursor: SyncCursor,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`MailStore`] over the `SQLite` repositories.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    accounts: AccountRepository,
    messages: MessageRepository,
}

impl SqliteStore {
    /// Combines the two repositories.
    #[must_use]
    pub const fn new(accounts: AccountRepository, messages: MessageRepository) -> Self {
        Self { accounts, messages }
    }

    /// Account repository.
    #[must_use]
    pub const fn accounts(&self) -> &AccountRepository {
        &self.accounts
    }

    /// Message repository.
    #[must_use]
    pub const fn messages(&self) -> &MessageRepository {
        &self.messages
    }
}

impl MailStore for SqliteStore {
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.accounts.get(id).await
    }

    async fn find_existing_message(
        &self,
        account_id: AccountId,
        message_id: &str,
        key: &CompositeKey,
    ) -> Result<bool> {
        self.messages.exists(account_id, message_id, key).await
    }

    async fn insert_messages(&self, account_id: AccountId, batch: &[NewMessage]) -> Result<usize> {
        self.messages.insert_batch(account_id, batch).await
    }

    async fn update_account_checkpoint(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.accounts.set_last_sync(account_id, at).await
    }

    async fn load_cursor(&self, account_id: AccountId) -> Result<Option<SyncCursor>> {
        self.messages.load_cursor(account_id).await
    }

    async fn save_cursor(&self, account_id: AccountId, cursor: SyncCursor) -> Result<()> {
        self.messages.save_cursor(account_id, cursor).await
    }
}

/// Shared `SQLite` pool holding accounts and messages.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the database file and its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the
    /// database cannot be opened.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        info!("Opened database at {}", path.display());
        Ok(db)
    }

    /// Creates an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<()> {
        self.accounts().initialize().await?;
        self.messages().initialize().await
    }

    /// Account repository over this pool.
    #[must_use]
    pub fn accounts(&self) -> AccountRepository {
        AccountRepository::new(self.pool.clone())
    }

    /// Message repository over this pool.
    #[must_use]
    pub fn messages(&self) -> MessageRepository {
        MessageRepository::new(self.pool.clone())
    }

    /// Sync store over this pool.
    #[must_use]
    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(self.accounts(), self.messages())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::account::{NewAccount, Security};

    fn message(id: &str) -> NewMessage {
        NewMessage {
            message_id: id.to_string(),
            synthetic_id: false,
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
            subject: format!("subject {id}"),
            content: "body".to_string(),
            snippet: "body".to_string(),
            received_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            is_read: false,
            has_attachments: false,
        }
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let account = db
            .accounts()
            .insert(
                &NewAccount::new("Work", "me@example.com", "imap.example.com", Security::Tls),
                "",
            )
            .await
            .unwrap();
        let store = db.store();

        assert!(store.find_account(account.id).await.unwrap().is_some());
        assert!(store.find_account(AccountId(999)).await.unwrap().is_none());

        let first = message("m1");
        assert_eq!(
            store
                .insert_messages(account.id, &[first.clone(), message("m2")])
                .await
                .unwrap(),
            2
        );
        assert!(
            store
                .find_existing_message(account.id, "m1", &first.composite_key())
                .await
                .unwrap()
        );

        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(store.update_account_checkpoint(account.id, at).await.unwrap());
        let reloaded = store.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_sync, Some(at));

        let cursor = SyncCursor {
            uid_validity: 3,
            last_uid: 40,
        };
        store.save_cursor(account.id, cursor).await.unwrap();
        assert_eq!(store.load_cursor(account.id).await.unwrap(), Some(cursor));
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = std::env::temp_dir().join(format!("mailsync-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("mail.db");

        let db = Database::open(&path).await.unwrap();
        assert!(db.accounts().list().await.unwrap().is_empty());
        db.close().await;
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
