//! Per-account advisory locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::account::AccountId;

/// Ensures at most one sync pass per account runs at a time.
#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    locks: Arc<Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AccountLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the account's lock, or returns `None` if a pass already holds it.
    ///
    /// The lock is released when the guard is dropped.
    #[must_use]
    pub fn try_acquire(&self, account_id: AccountId) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(account_id).or_default())
        };
        lock.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let locks = AccountLocks::new();
        let guard = locks.try_acquire(AccountId(1));
        assert!(guard.is_some());
        assert!(locks.try_acquire(AccountId(1)).is_none());
        assert!(locks.try_acquire(AccountId(2)).is_some());

        drop(guard);
        assert!(locks.try_acquire(AccountId(1)).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let locks = AccountLocks::new();
        let other = locks.clone();
        let _guard = locks.try_acquire(AccountId(9));
        assert!(other.try_acquire(AccountId(9)).is_none());
    }
}
