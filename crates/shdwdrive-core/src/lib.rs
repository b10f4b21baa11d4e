//! shdwdrive Core - Storage account reconciliation and domain logic
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `StorageAccount`, `StoredFile`, `EntityId`, `SizeSpec`
//! - **Port definitions** - Traits for adapters: `IStorageProvider`, `IAccountReader`,
//!   `IFileReader`, `IRequestObserver`
//! - **Poller** - Cancellable retry/poll loop with a failure budget and a deadline
//! - **Action tracker** - Per-entity pending-action sets driving UI affordances
//! - **Local cache** - Client snapshot of accounts and files per account
//! - **Use cases** - `ReconciliationOrchestrator` confirming mutations against
//!   an eventually-consistent read source
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O. Ports define the
//! trait interfaces that adapter crates (`shdwdrive-http`) or the embedding
//! application implement. The orchestrator wires ports, the poller, the
//! tracker and the cache together for a single [`session::Session`].

pub mod cache;
pub mod config;
pub mod domain;
pub mod poll;
pub mod ports;
pub mod session;
pub mod tracker;
pub mod usecases;
