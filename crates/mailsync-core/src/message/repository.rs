//! Stored message repository.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{
    CompositeKey, MessageId, MessageQuery, NewMessage, ReadFilter, StoredMessage, SyncCursor,
    format_received,
};
use crate::Result;
use crate::account::{AccountId, parse_timestamp};

const MESSAGE_COLUMNS: &str = "id, account_id, message_id, synthetic_id, from_addr, to_addr, \
     subject, content, snippet, received_at, is_read, has_attachments, created_at";

/// Repository for synced messages and per-account sync cursors.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a repository over an open pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize database schema. Requires the `accounts` table.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                message_id TEXT NOT NULL,
                synthetic_id INTEGER NOT NULL DEFAULT 0,
                from_addr TEXT NOT NULL DEFAULT '',
                to_addr TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                received_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(account_id, message_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_composite
            ON messages(account_id, from_addr, subject, received_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_received
            ON messages(account_id, received_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_cursors (
                account_id INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
                uid_validity INTEGER NOT NULL,
                last_uid INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns true if the account already has a message with this id or
    /// with the same sender, subject and received time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn exists(
        &self,
        account_id: AccountId,
        message_id: &str,
        key: &CompositeKey,
    ) -> Result<bool> {
        let row = sqlx::query(
            r"
            SELECT 1 FROM messages
            WHERE account_id = ?
              AND (message_id = ?
                   OR (from_addr = ? AND subject = ? AND received_at = ?))
            LIMIT 1
            ",
        )
        .bind(account_id.0)
        .bind(message_id)
        .bind(&key.from)
        .bind(&key.subject)
        .bind(format_received(key.received_at))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Insert a batch in one transaction. Rows whose message id is already
    /// stored for the account are skipped.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is inserted then.
    pub async fn insert_batch(&self, account_id: AccountId, batch: &[NewMessage]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let created_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for message in batch {
            let result = sqlx::query(
                r"
                INSERT INTO messages
                    (account_id, message_id, synthetic_id, from_addr, to_addr, subject,
                     content, snippet, received_at, is_read, has_attachments, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(account_id, message_id) DO NOTHING
                ",
            )
            .bind(account_id.0)
            .bind(&message.message_id)
            .bind(message.synthetic_id)
            .bind(&message.from)
            .bind(&message.to)
            .bind(&message.subject)
            .bind(&message.content)
            .bind(&message.snippet)
            .bind(format_received(message.received_at))
            .bind(message.is_read)
            .bind(message.has_attachments)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        debug!(
            "Inserted {inserted} of {} messages for account {account_id}",
            batch.len()
        );
        Ok(inserted)
    }

    /// One page of messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        if query.page_size == 0 {
            return Ok(Vec::new());
        }

        let account = query.account_id.map(|id| id.0);
        let read = query.filter.as_flag();
        let sql = format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (? IS NULL OR account_id = ?)
              AND (? IS NULL OR is_read = ?)
            ORDER BY received_at DESC, id DESC
            LIMIT ? OFFSET ?
            "
        );

        let rows = sqlx::query(&sql)
            .bind(account)
            .bind(account)
            .bind(read)
            .bind(read)
            .bind(i64::from(query.page_size))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    /// Number of messages matching the account and filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self, account_id: Option<AccountId>, filter: ReadFilter) -> Result<u64> {
        let account = account_id.map(|id| id.0);
        let read = filter.as_flag();
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n FROM messages
            WHERE (? IS NULL OR account_id = ?)
              AND (? IS NULL OR is_read = ?)
            ",
        )
        .bind(account)
        .bind(account)
        .bind(read)
        .bind(read)
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(row.get::<i64, _>("n")).unwrap_or_default())
    }

    /// Get message by local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: MessageId) -> Result<Option<StoredMessage>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// Set the read flag. Returns `false` if the message does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_read(&self, id: MessageId) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Load the sync cursor of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load_cursor(&self, account_id: AccountId) -> Result<Option<SyncCursor>> {
        let row =
            sqlx::query("SELECT uid_validity, last_uid FROM sync_cursors WHERE account_id = ?")
                .bind(account_id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|row| SyncCursor {
            uid_validity: u32::try_from(row.get::<i64, _>("uid_validity")).unwrap_or_default(),
            last_uid: u32::try_from(row.get::<i64, _>("last_uid")).unwrap_or_default(),
        }))
    }

    /// Store the sync cursor of an account, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save_cursor(&self, account_id: AccountId, cursor: SyncCursor) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sync_cursors (account_id, uid_validity, last_uid, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                uid_validity = excluded.uid_validity,
                last_uid = excluded.last_uid,
                updated_at = excluded.updated_at
            ",
        )
        .bind(account_id.0)
        .bind(i64::from(cursor.uid_validity))
        .bind(i64::from(cursor.last_uid))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to a `StoredMessage`.
fn row_to_message(row: &SqliteRow) -> StoredMessage {
    StoredMessage {
        id: MessageId(row.get("id")),
        account_id: AccountId::new(row.get("account_id")),
        message_id: row.get("message_id"),
        synthetic_id: row.get::<i64, _>("synthetic_id") != 0,
        from: row.get("from_addr"),
        to: row.get("to_addr"),
        subject: row.get("subject"),
        content: row.get("content"),
        snippet: row.get("snippet"),
        received_at: parse_timestamp(row.get("received_at")),
        is_read: row.get::<i64, _>("is_read") != 0,
        has_attachments: row.get::<i64, _>("has_attachments") != 0,
        created_at: parse_timestamp(row.get("created_at")),
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
    use chrono::{DateTime, Duration, TimeZone};

    use super::*;
    use crate::Database;
    use crate::account::{NewAccount, Security};

    fn message(id: &str, minutes: i64) -> NewMessage {
        NewMessage {
            message_id: id.to_string(),
            synthetic_id: false,
            from: "alice@example.com".to_string(),
            to: "bob@example.com".to_string(),
            subject: format!("Subject {id}"),
            content: "Body".to_string(),
            snippet: "Body".to_string(),
            received_at: base_time() + Duration::minutes(minutes),
            is_read: false,
            has_attachments: false,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    async fn setup() -> (Database, AccountId) {
        let db = Database::in_memory().await.unwrap();
        let account = db
            .accounts()
            .insert(
                &NewAccount::new("Test", "t@example.com", "imap.example.com", Security::Tls),
                "pw",
            )
            .await
            .unwrap();
        (db, account.id)
    }

    #[tokio::test]
    async fn test_insert_batch_skips_duplicates() {
        let (db, account) = setup().await;
        let repo = db.messages();

        let batch = vec![message("a", 0), message("b", 1), message("a", 2)];
        assert_eq!(repo.insert_batch(account, &batch).await.unwrap(), 2);
        assert_eq!(repo.insert_batch(account, &batch).await.unwrap(), 0);
        assert_eq!(repo.count(Some(account), ReadFilter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exists_by_id_or_composite() {
        let (db, account) = setup().await;
        let repo = db.messages();
        let stored = message("orig", 0);
        repo.insert_batch(account, &[stored.clone()]).await.unwrap();

        let other_key = message("x", 30).composite_key();
        assert!(repo.exists(account, "orig", &other_key).await.unwrap());
        assert!(
            repo.exists(account, "fresh-uuid", &stored.composite_key())
                .await
                .unwrap()
        );
        assert!(!repo.exists(account, "fresh-uuid", &other_key).await.unwrap());
        assert!(
            !repo
                .exists(AccountId::new(999), "orig", &other_key)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_list_pages_newest_first_with_filter() {
        let (db, account) = setup().await;
        let repo = db.messages();
        let batch: Vec<NewMessage> = (0..5).map(|i| message(&format!("m{i}"), i)).collect();
        repo.insert_batch(account, &batch).await.unwrap();

        let page = repo
            .list(&MessageQuery {
                account_id: Some(account),
                page: 1,
                page_size: 2,
                filter: ReadFilter::All,
            })
            .await
            .unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m4", "m3"]);

        let last = repo
            .list(&MessageQuery {
                page: 3,
                page_size: 2,
                ..MessageQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].message_id, "m0");
        assert_eq!(last[0].received_at, base_time());

        let target = page[0].id;
        assert!(repo.mark_read(target).await.unwrap());
        assert!(!repo.mark_read(MessageId(12345)).await.unwrap());
        assert_eq!(repo.count(None, ReadFilter::Read).await.unwrap(), 1);
        assert_eq!(repo.count(None, ReadFilter::Unread).await.unwrap(), 4);

        let unread = repo
            .list(&MessageQuery {
                filter: ReadFilter::Unread,
                ..MessageQuery::default()
            })
            .await
            .unwrap();
        assert!(unread.iter().all(|m| !m.is_read && m.id != target));
        assert!(repo.get(target).await.unwrap().unwrap().is_read);
    }

    #[tokio::test]
    async fn test_cursor_upsert() {
        let (db, account) = setup().await;
        let repo = db.messages();
        assert!(repo.load_cursor(account).await.unwrap().is_none());

        let cursor = SyncCursor {
            uid_validity: 7,
            last_uid: 40,
        };
        repo.save_cursor(account, cursor).await.unwrap();
        repo.save_cursor(
            account,
            SyncCursor {
                last_uid: 90,
                ..cursor
            },
        )
        .await
        .unwrap();
        assert_eq!(
            repo.load_cursor(account).await.unwrap(),
            Some(SyncCursor {
                uid_validity: 7,
                last_uid: 90
            })
        );
    }

    #[tokio::test]
    async fn test_account_delete_cascades() {
        let (db, account) = setup().await;
        db.messages()
            .insert_batch(account, &[message("a", 0)])
            .await
            .unwrap();
        db.messages()
            .save_cursor(
                account,
                SyncCursor {
                    uid_validity: 1,
                    last_uid: 1,
                },
            )
            .await
            .unwrap();

        assert!(db.accounts().delete(account).await.unwrap());
        assert_eq!(db.messages().count(None, ReadFilter::All).await.unwrap(), 0);
        assert!(db.messages().load_cursor(account).await.unwrap().is_none());
    }
}
