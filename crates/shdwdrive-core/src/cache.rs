//! Local snapshot cache
//!
//! Holds the client's view of storage accounts and of the files stored in
//! each account. Every commit is a read-modify-write under the container's
//! write lock and derives the new value from the state current at commit
//! time, so concurrent commits never lose each other's updates.
//!
//! Lock poisoning is ignored: the containers hold plain values that stay
//! consistent even if a writer panicked.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{StorageAccount, StorageAccountKey, StoredFile};

#[derive(Debug, Default)]
pub struct LocalCache {
    accounts: RwLock<Vec<StorageAccount>>,
    files: RwLock<HashMap<StorageAccountKey, Vec<StoredFile>>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_accounts(&self) -> RwLockReadGuard<'_, Vec<StorageAccount>> {
        self.accounts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_accounts(&self) -> RwLockWriteGuard<'_, Vec<StorageAccount>> {
        self.accounts.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_files(&self) -> RwLockReadGuard<'_, HashMap<StorageAccountKey, Vec<StoredFile>>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_files(&self) -> RwLockWriteGuard<'_, HashMap<StorageAccountKey, Vec<StoredFile>>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Accounts in insertion order
    #[must_use]
    pub fn accounts(&self) -> Vec<StorageAccount> {
        self.read_accounts().clone()
    }

    /// Accounts sorted by creation time, newest first
    #[must_use]
    pub fn accounts_newest_first(&self) -> Vec<StorageAccount> {
        let mut accounts = self.accounts();
        accounts.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        accounts
    }

    #[must_use]
    pub fn account(&self, key: &StorageAccountKey) -> Option<StorageAccount> {
        self.read_accounts().iter().find(|a| &a.key == key).cloned()
    }

    /// Replaces the whole account list
    pub fn replace_accounts(&self, accounts: Vec<StorageAccount>) {
        *self.write_accounts() = accounts;
    }

    /// Replaces the account with the same key in place, or appends it
    ///
    /// Returns `true` if an existing entry was replaced.
    pub fn upsert_account(&self, account: StorageAccount) -> bool {
        let mut accounts = self.write_accounts();
        match accounts.iter_mut().find(|a| a.key == account.key) {
            Some(existing) => {
                *existing = account;
                true
            }
            None => {
                accounts.push(account);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Files of one account, `None` if they were never fetched
    #[must_use]
    pub fn files(&self, key: &StorageAccountKey) -> Option<Vec<StoredFile>> {
        self.read_files().get(key).cloned()
    }

    /// Replaces one account's file list
    pub fn replace_files(&self, key: &StorageAccountKey, files: Vec<StoredFile>) {
        self.write_files().insert(key.clone(), files);
    }

    /// Replaces every account's file list at once
    pub fn replace_all_files(&self, files: HashMap<StorageAccountKey, Vec<StoredFile>>) {
        *self.write_files() = files;
    }
}
