//! High-level operations for front ends.
//!
//! [`MailService`] ties the database, the credential vault and the sync
//! engine together behind the operations a user interface needs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::{
    Account, AccountId, AccountRepository, AccountUpdate, Endpoint, NewAccount, Vault,
    validate_account,
};
use crate::message::{MessageId, MessageQuery, MessageRepository, ReadFilter, StoredMessage};
use crate::store::{Database, SqliteStore};
use crate::sync::{
    ImapConnector, LogProgress, MailConnector, MailSession, ProgressSink, SyncEngine, SyncMode,
    SyncReport, WindowConfig,
};
use crate::{Error, Result};

/// Account, message and sync operations over one database.
#[derive(Debug)]
pub struct MailService<C = ImapConnector> {
    accounts: AccountRepository,
    messages: MessageRepository,
    vault: Arc<Vault>,
    engine: SyncEngine<SqliteStore, C>,
}

impl<C> MailService<C>
where
    C: MailConnector,
{
    /// Creates the service.
    #[must_use]
    pub fn new(db: &Database, vault: Vault, connector: C, window: WindowConfig) -> Self {
        let vault = Arc::new(vault);
        Self {
            accounts: db.accounts(),
            messages: db.messages(),
            engine: SyncEngine::new(db.store(), Arc::clone(&vault), connector, window),
            vault,
        }
    }

    /// All accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.list().await
    }

    /// One account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.accounts.get(id).await
    }

    /// Validates and stores a new account, protecting its password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad fields, or a database error.
    pub async fn create_account(&self, fields: NewAccount, password: &str) -> Result<Account> {
        validate_account(&fields, Some(password)).map_err(Error::Validation)?;

        let protected = self.vault.protect(password);
        let account = self.accounts.insert(&fields, &protected).await?;
        info!("Created account {} ({})", account.id, account.email);
        Ok(account)
    }

    /// Updates an account. The password is replaced only when a non-empty
    /// one is given.
    ///
    /// Returns `false` if the account does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad fields, or a database error.
    pub async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
        password: Option<&str>,
    ) -> Result<bool> {
        let Some(existing) = self.accounts.get(id).await? else {
            return Ok(false);
        };

        let fields = update.apply(&existing);
        validate_account(&fields, None).map_err(Error::Validation)?;

        let protected = password
            .filter(|p| !p.is_empty())
            .map(|p| self.vault.protect(p));
        self.accounts.update(id, &fields, protected.as_deref()).await
    }

    /// Deletes an account with its messages.
    ///
    /// Returns `false` if the account does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_account(&self, id: AccountId) -> Result<bool> {
        let deleted = self.accounts.delete(id).await?;
        if deleted {
            info!("Deleted account {id}");
        }
        Ok(deleted)
    }

    /// Tries to connect and log in. Any failure is `false`.
    pub async fn test_connection(
        &self,
        endpoint: &Endpoint,
        username: &str,
        password: &str,
    ) -> bool {
        let mut session = match self.engine.connector().connect(endpoint).await {
            Ok(session) => session,
            Err(e) => {
                warn!(host = %endpoint.host, "Connection test failed: {e}");
                return false;
            }
        };

        let result = session.authenticate(username, password).await;
        session.disconnect().await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(host = %endpoint.host, "Connection test failed: {e}");
                false
            }
        }
    }

    /// Tests a stored account with its stored password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or a database error.
    pub async fn test_account(&self, id: AccountId) -> Result<bool> {
        let account = self
            .accounts
            .get(id)
            .await?
            .ok_or(Error::AccountNotFound(id))?;
        let password = self.vault.reveal(&account.protected_password);
        Ok(self
            .test_connection(&account.endpoint, &account.email, &password)
            .await)
    }

    /// Syncs an account and returns the number of new messages.
    pub async fn sync_account(&self, id: AccountId, full: bool) -> usize {
        let mode = if full {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        };
        self.sync_account_with(id, mode, &LogProgress, &CancellationToken::new())
            .await
            .new_messages
    }

    /// Syncs an account with a progress sink and cancellation token.
    pub async fn sync_account_with(
        &self,
        id: AccountId,
        mode: SyncMode,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> SyncReport {
        self.engine.sync_account(id, mode, progress, cancel).await
    }

    /// One page of stored messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        self.messages.list(query).await
    }

    /// Number of stored messages matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_messages(
        &self,
        account_id: Option<AccountId>,
        filter: ReadFilter,
    ) -> Result<u64> {
        self.messages.count(account_id, filter).await
    }

    /// One stored message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_message(&self, id: MessageId) -> Result<Option<StoredMessage>> {
        self.messages.get(id).await
    }

    /// Marks a message read. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_read(&self, id: MessageId) -> Result<bool> {
        self.messages.mark_read(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::{Security, ValidationError};

    async fn service() -> MailService {
        let db = Database::in_memory().await.unwrap();
        MailService::new(
            &db,
            Vault::new("test-key"),
            ImapConnector::default(),
            WindowConfig::default(),
        )
    }

    fn fields(email: &str) -> NewAccount {
        NewAccount::new("Work", email, "imap.example.com", Security::Tls)
    }

    #[tokio::test]
    async fn test_create_protects_password() {
        let svc = service().await;
        let account = svc
            .create_account(fields("me@example.com"), "hunter2")
            .await
            .unwrap();

        assert_ne!(account.protected_password, "hunter2");
        assert_eq!(svc.vault.reveal(&account.protected_password), "hunter2");
        assert_eq!(account.endpoint.port, 993);
    }

    #[tokio::test]
    async fn test_create_validates() {
        let svc = service().await;
        let err = svc
            .create_account(fields("not-an-email"), "")
            .await
            .unwrap_err();
        let Error::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains(&ValidationError::InvalidEmail));
        assert!(errors.contains(&ValidationError::EmptyPassword));
        assert!(svc.list_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_password_unless_given() {
        let svc = service().await;
        let account = svc
            .create_account(fields("me@example.com"), "old")
            .await
            .unwrap();

        let rename = AccountUpdate {
            name: Some("Personal".to_string()),
            ..AccountUpdate::default()
        };
        assert!(svc.update_account(account.id, &rename, Some("")).await.unwrap());
        let updated = svc.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "Personal");
        assert_eq!(svc.vault.reveal(&updated.protected_password), "old");

        assert!(
            svc.update_account(account.id, &AccountUpdate::default(), Some("new"))
                .await
                .unwrap()
        );
        let updated = svc.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(svc.vault.reveal(&updated.protected_password), "new");

        assert!(
            !svc.update_account(AccountId(404), &rename, None)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete_account() {
        let svc = service().await;
        let account = svc
            .create_account(fields("me@example.com"), "pw")
            .await
            .unwrap();
        assert!(svc.delete_account(account.id).await.unwrap());
        assert!(!svc.delete_account(account.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_unknown_account_is_zero() {
        let svc = service().await;
        assert_eq!(svc.sync_account(AccountId(7), true).await, 0);
    }

    #[tokio::test]
    async fn test_connection_to_closed_port_is_false() {
        let svc = service().await;
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: 1,
            security: Security::None,
        };
        assert!(!svc.test_connection(&endpoint, "me", "pw").await);
    }

    #[tokio::test]
    async fn test_mark_read_missing_is_false() {
        let svc = service().await;
        assert!(!svc.mark_read(MessageId(1)).await.unwrap());
        assert!(svc.get_message(MessageId(1)).await.unwrap().is_none());
    }
}
