//! Account storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{Account, AccountId, Endpoint, NewAccount, Security};
use crate::Result;

/// Repository for account storage and retrieval.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Create a repository over an open pool.
    ///
    /// Call [`initialize`](Self::initialize) once before use; the
    /// [`Database`](crate::Database) constructors do this.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize database schema.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                security TEXT NOT NULL,
                protected_password TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_sync TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, host, port, security, protected_password,
                   created_at, last_sync
            FROM accounts
            ORDER BY created_at DESC, id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, host, port, security, protected_password,
                   created_at, last_sync
            FROM accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Insert a new account with an already protected password.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including when the email
    /// address is already in use.
    pub async fn insert(&self, fields: &NewAccount, protected_password: &str) -> Result<Account> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO accounts (name, email, host, port, security, protected_password, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(&fields.host)
        .bind(i64::from(fields.port))
        .bind(fields.security.as_str())
        .bind(protected_password)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = AccountId::new(result.last_insert_rowid());
        debug!("Inserted account {id}");

        Ok(Account {
            id,
            name: fields.name.clone(),
            email: fields.email.clone(),
            endpoint: fields.endpoint(),
            protected_password: protected_password.to_string(),
            created_at,
            last_sync: None,
        })
    }

    /// Update an account's fields, replacing the password only when
    /// `protected_password` is given.
    ///
    /// Returns `false` if the account does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update(
        &self,
        id: AccountId,
        fields: &NewAccount,
        protected_password: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts SET
                name = ?, email = ?, host = ?, port = ?, security = ?,
                protected_password = COALESCE(?, protected_password)
            WHERE id = ?
            ",
        )
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(&fields.host)
        .bind(i64::from(fields.port))
        .bind(fields.security.as_str())
        .bind(protected_password)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record when a sync pass for the account last completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_last_sync(&self, id: AccountId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET last_sync = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an account. Its messages and sync cursor go with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: AccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Parses a stored RFC 3339 timestamp, falling back to the Unix epoch.
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Convert a database row to an Account.
fn row_to_account(row: &SqliteRow) -> Account {
    let last_sync: Option<String> = row.get("last_sync");

    Account {
        id: AccountId::new(row.get("id")),
        name: row.get("name"),
        email: row.get("email"),
        endpoint: Endpoint {
            host: row.get("host"),
            port: u16::try_from(row.get::<i64, _>("port")).unwrap_or_default(),
            security: Security::from_db(row.get("security")),
        },
        protected_password: row.get("protected_password"),
        created_at: parse_timestamp(row.get("created_at")),
        last_sync: last_sync.as_deref().map(parse_timestamp),
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
    use super::*;
    use crate::Database;

    fn fields(email: &str) -> NewAccount {
        NewAccount::new("Test", email, "imap.example.com", Security::Tls)
    }

    #[tokio::test]
    async fn test_create_and_retrieve_account() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.accounts();

        let account = repo.insert(&fields("test@example.com"), "opaque").await.unwrap();
        let retrieved = repo.get(account.id).await.unwrap().unwrap();
        assert_eq!(retrieved.email, "test@example.com");
        assert_eq!(retrieved.endpoint.port, 993);
        assert_eq!(retrieved.protected_password, "opaque");
        assert!(retrieved.last_sync.is_none());
    }

    #[tokio::test]
    async fn test_list_accounts_newest_first() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.accounts();

        let first = repo.insert(&fields("user1@example.com"), "a").await.unwrap();
        let second = repo.insert(&fields("user2@example.com"), "b").await.unwrap();

        let ids: Vec<AccountId> = repo.list().await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.accounts();
        repo.insert(&fields("dup@example.com"), "a").await.unwrap();
        assert!(repo.insert(&fields("dup@example.com"), "b").await.is_err());
    }

    #[tokio::test]
    async fn test_update_keeps_password_when_absent() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.accounts();
        let account = repo.insert(&fields("a@example.com"), "old").await.unwrap();

        let mut changed = fields("a@example.com");
        changed.name = "Renamed".to_string();
        assert!(repo.update(account.id, &changed, None).await.unwrap());
        let stored = repo.get(account.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.protected_password, "old");

        assert!(repo.update(account.id, &changed, Some("new")).await.unwrap());
        let stored = repo.get(account.id).await.unwrap().unwrap();
        assert_eq!(stored.protected_password, "new");

        assert!(!repo.update(AccountId::new(99), &changed, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_last_sync_and_delete() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.accounts();
        let account = repo.insert(&fields("a@example.com"), "pw").await.unwrap();

        let at = parse_timestamp("2024-03-01T10:00:00+00:00");
        assert!(repo.set_last_sync(account.id, at).await.unwrap());
        assert_eq!(repo.get(account.id).await.unwrap().unwrap().last_sync, Some(at));

        assert!(repo.delete(account.id).await.unwrap());
        assert!(!repo.delete(account.id).await.unwrap());
        assert!(repo.get(account.id).await.unwrap().is_none());
    }

    #[test]
    fn test_parse_timestamp_fallback() {
        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
