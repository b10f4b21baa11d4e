//! Storage provider port (driven/secondary port)
//!
//! Interface to the remote mutation SDK. Every call only *submits* a
//! mutation; its effect becomes visible through the read ports some time
//! later, which is what the orchestrator polls for.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific.
//! - Returned values are port-level DTOs, not snapshots. Snapshots always
//!   come from the read ports.

use serde::{Deserialize, Serialize};

use crate::domain::{FileUpload, SizeSpec, StorageAccountKey};

/// Acknowledgement of an accepted account creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountReceipt {
    /// Key of the account that will appear in the read source
    pub storage_account: StorageAccountKey,
    /// Transaction signature of the creation
    pub transaction_signature: String,
}

/// Outcome of one item in an upload batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub file_name: String,
    /// CDN location of the uploaded file
    pub location: Option<String>,
    /// Confirmation signature; `None` means the item was not stored
    pub transaction_signature: Option<String>,
}

impl UploadResult {
    /// Whether the storage network confirmed this item
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.transaction_signature
            .as_deref()
            .is_some_and(|sig| !sig.is_empty())
    }
}

/// Port trait for remote mutations on storage accounts and files
///
/// A successful return means the request was accepted, not that its effect
/// is already readable.
#[async_trait::async_trait]
pub trait IStorageProvider: Send + Sync {
    /// Submits the creation of a storage account
    ///
    /// # Arguments
    /// * `name` - Human-readable account identifier
    /// * `size` - Storage to reserve
    async fn create_account(
        &self,
        name: &str,
        size: &SizeSpec,
    ) -> anyhow::Result<CreateAccountReceipt>;

    /// Flags an account for deletion at the end of the current epoch
    async fn delete_account(&self, key: &StorageAccountKey) -> anyhow::Result<()>;

    /// Cancels a pending account deletion
    async fn cancel_delete_account(&self, key: &StorageAccountKey) -> anyhow::Result<()>;

    /// Makes an account and all of its files permanent
    async fn make_immutable(&self, key: &StorageAccountKey) -> anyhow::Result<()>;

    /// Reduces the storage reserved for an account by `size`
    async fn reduce_storage(&self, key: &StorageAccountKey, size: &SizeSpec)
        -> anyhow::Result<()>;

    /// Deletes a file given its CDN URL
    async fn delete_file(&self, key: &StorageAccountKey, url: &str) -> anyhow::Result<()>;

    /// Replaces the content at `url` with `upload`
    async fn replace_file(
        &self,
        key: &StorageAccountKey,
        url: &str,
        upload: FileUpload,
    ) -> anyhow::Result<()>;

    /// Uploads a batch of files
    ///
    /// # Returns
    /// One [`UploadResult`] per submitted file. Items without a
    /// confirmation signature were not stored.
    async fn upload_files(
        &self,
        key: &StorageAccountKey,
        uploads: Vec<FileUpload>,
    ) -> anyhow::Result<Vec<UploadResult>>;
}
