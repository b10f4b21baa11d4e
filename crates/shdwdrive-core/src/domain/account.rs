//! Storage account snapshot
//!
//! A `StorageAccount` is the last-known on-chain state of one storage
//! account as returned by the read port. Snapshots are never patched
//! field-by-field; reconciliation replaces them wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::EntityId;
use super::newtypes::{OwnerAddress, StorageAccountKey};

/// On-chain layout version of a storage account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountVersion {
    V1,
    V2,
}

impl std::fmt::Display for AccountVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountVersion::V1 => write!(f, "v1"),
            AccountVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Snapshot of a storage account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccount {
    /// Public key of the storage account
    pub key: StorageAccountKey,
    /// Human-readable account name chosen at creation
    pub identifier: String,
    /// Bytes reserved for this account
    pub reserved_bytes: u64,
    /// Bytes currently used by stored files
    pub current_usage: u64,
    /// Whether the account (and its files) can no longer change
    pub immutable: bool,
    /// Whether the account has been flagged for deletion
    pub to_be_deleted: bool,
    /// Epoch in which deletion was requested (0 when not flagged)
    pub delete_request_epoch: u64,
    /// Wallet that owns the account
    pub owner: OwnerAddress,
    pub version: AccountVersion,
    pub creation_time: DateTime<Utc>,
    pub creation_epoch: u64,
    pub last_fee_epoch: u64,
}

impl StorageAccount {
    /// Identity used by the cache and the action tracker
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        EntityId::for_account(&self.key)
    }

    /// Reserved bytes not yet used by files
    #[must_use]
    pub fn available_bytes(&self) -> u64 {
        self.reserved_bytes.saturating_sub(self.current_usage)
    }

    /// Whether files can be added to, replaced in or removed from this account
    #[must_use]
    pub fn accepts_file_changes(&self) -> bool {
        !self.immutable && !self.to_be_deleted
    }
}
