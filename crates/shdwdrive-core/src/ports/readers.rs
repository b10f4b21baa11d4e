//! Read ports (the remote source of truth)
//!
//! Reads are eventually consistent: a mutation accepted by
//! [`IStorageProvider`](super::IStorageProvider) may take several reads to
//! become visible. Reads are treated as idempotent and repeatable.

use crate::domain::{StorageAccount, StorageAccountKey, StoredFile};

/// Port trait for reading storage accounts
#[async_trait::async_trait]
pub trait IAccountReader: Send + Sync {
    /// Lists every storage account owned by the session principal
    async fn list_accounts(&self) -> anyhow::Result<Vec<StorageAccount>>;

    /// Fetches one storage account
    async fn get_account(&self, key: &StorageAccountKey) -> anyhow::Result<StorageAccount>;
}

/// Port trait for reading files
#[async_trait::async_trait]
pub trait IFileReader: Send + Sync {
    /// Lists the files stored in an account, in listing order
    async fn list_files(&self, key: &StorageAccountKey) -> anyhow::Result<Vec<StoredFile>>;

    /// Downloads a file's content
    async fn download_file(&self, file: &StoredFile) -> anyhow::Result<Vec<u8>>;
}
