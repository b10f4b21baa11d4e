//! Stored files and uploads

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::identity::EntityId;
use super::newtypes::StorageAccountKey;

/// Rejects names the CDN path scheme cannot address
fn validate_file_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::InvalidFileName(
            "file name cannot be empty".to_string(),
        ));
    }
    if name.contains('/') {
        return Err(DomainError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Public URL of a file on the CDN
///
/// The path is `{account}/{name}`, which is also the file's [`EntityId`].
#[must_use]
pub fn file_url(cdn_base: &str, account: &StorageAccountKey, name: &str) -> String {
    format!("{}/{}/{}", cdn_base.trim_end_matches('/'), account, name)
}

/// Snapshot of a file stored in a storage account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredFile {
    /// File name, unique within its account
    pub name: String,
    /// Account the file belongs to
    pub storage_account: StorageAccountKey,
}

impl StoredFile {
    pub fn new(storage_account: StorageAccountKey, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_account,
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        EntityId::for_file(&self.storage_account, &self.name)
    }

    /// CDN URL of this file
    #[must_use]
    pub fn url(&self, cdn_base: &str) -> String {
        file_url(cdn_base, &self.storage_account, &self.name)
    }
}

/// Content to be uploaded to a storage account
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    name: String,
    data: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Result<Self, DomainError> {
        let name = name.into();
        validate_file_name(&name)?;
        Ok(Self { name, data })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same content under another name
    ///
    /// Replacing a file keeps the target's name regardless of the name the
    /// upload was picked under.
    pub fn renamed(self, name: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(name, self.data)
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}
