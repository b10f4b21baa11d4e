//! Entity identity resolution
//!
//! Derives the stable string identity used to index pending-action state
//! and cached snapshots. Accounts are identified by their public key; files
//! by their account key and name joined with `/`, which is also the path of
//! the file on the CDN. Base58 keys never contain `/`, so the parent scope
//! and local name cannot be confused.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::newtypes::StorageAccountKey;

/// Kind of entity an [`EntityId`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A storage account (including one still being created)
    Account,
    /// A file stored in an account
    File,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Account => write!(f, "account"),
            EntityKind::File => write!(f, "file"),
        }
    }
}

/// Stable identity of an account or file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    kind: EntityKind,
    key: String,
}

impl EntityId {
    /// Identity of an existing storage account
    #[must_use]
    pub fn for_account(key: &StorageAccountKey) -> Self {
        Self {
            kind: EntityKind::Account,
            key: key.as_str().to_string(),
        }
    }

    /// Identity of an account that is still being created and has no key yet
    #[must_use]
    pub fn for_new_account(name: &str) -> Self {
        Self {
            kind: EntityKind::Account,
            key: format!("new/{name}"),
        }
    }

    /// Identity of a file within a storage account
    #[must_use]
    pub fn for_file(account: &StorageAccountKey, name: &str) -> Self {
        Self {
            kind: EntityKind::File,
            key: format!("{}/{}", account.as_str(), name),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}
