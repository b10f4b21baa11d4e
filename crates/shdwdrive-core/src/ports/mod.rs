//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the boundaries of the reconciliation core. Their
//! implementations live in adapter crates or in the embedding application.
//!
//! ## Ports Overview
//!
//! - [`IStorageProvider`] - Remote mutations (create, delete, upload, ...)
//! - [`IAccountReader`] - Read source of truth for storage accounts
//! - [`IFileReader`] - Read source of truth for files
//! - [`IRequestObserver`] - Success and error notifications for requests

pub mod observer;
pub mod readers;
pub mod storage_provider;

pub use observer::{IRequestObserver, NoopObserver};
pub use readers::{IAccountReader, IFileReader};
pub use storage_provider::{CreateAccountReceipt, IStorageProvider, UploadResult};
