//! Domain entities and value types
//!
//! This module contains the core domain types for shdwdrive:
//! - Newtypes for validated keys and session identifiers
//! - Storage account and stored file snapshots
//! - Entity identities used to index pending-action state
//! - Action kinds tracked per entity
//! - Size specifiers and byte formatting helpers
//! - Domain-specific error types

pub mod account;
pub mod action;
pub mod errors;
pub mod file;
pub mod identity;
pub mod newtypes;
pub mod size;

// Re-export commonly used types
pub use account::{AccountVersion, StorageAccount};
pub use action::ActionKind;
pub use errors::DomainError;
pub use file::{file_url, FileUpload, StoredFile};
pub use identity::{EntityId, EntityKind};
pub use newtypes::{OwnerAddress, SessionId, StorageAccountKey};
pub use size::{format_bytes, storage_cost, SizeSpec, SizeUnit};
