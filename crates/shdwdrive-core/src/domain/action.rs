//! Pending action kinds
//!
//! An `ActionKind` names a request believed to be in flight for an entity.
//! Action kinds only drive UI affordances (spinners, disabled controls);
//! they never lock an entity.

use serde::{Deserialize, Serialize};

/// Kind of request pending for a storage account or file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    /// A new storage account is being created
    Creating,
    /// Account or file deletion was requested
    Deleting,
    /// A pending account deletion is being cancelled
    CancellingDeletion,
    /// The account is being made immutable
    MakingImmutable,
    /// The account's reserved storage is being reduced
    ReducingSize,
    /// A file's content is being replaced
    Replacing,
    /// Files are being uploaded to the account
    Uploading,
    /// The account's file list is being fetched
    FetchingFiles,
    /// A mutation was accepted and its effect is being confirmed
    Polling,
}

impl ActionKind {
    /// Stable camelCase name, identical to the serde representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionKind::Creating => "creating",
            ActionKind::Deleting => "deleting",
            ActionKind::CancellingDeletion => "cancellingDeletion",
            ActionKind::MakingImmutable => "makingImmutable",
            ActionKind::ReducingSize => "reducingSize",
            ActionKind::Replacing => "replacing",
            ActionKind::Uploading => "uploading",
            ActionKind::FetchingFiles => "fetchingFiles",
            ActionKind::Polling => "polling",
        }
    }

    /// Whether this kind marks a remote mutation (as opposed to a read)
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, ActionKind::FetchingFiles | ActionKind::Polling)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
