//! Use cases (interactors) for shdwdrive
//!
//! Application use cases coordinating domain values, ports, the poller,
//! the action tracker and the local cache.
//!
//! ## Use Cases
//!
//! - [`ReconciliationOrchestrator`] - Submits mutations and confirms them
//!   against the read source, plus the cache-backed read operations

pub mod error;
pub mod locks;
pub mod markers;
pub mod reconcile;

pub use error::DriveError;
pub use locks::{EntityGuard, EntityLocks};
pub use markers::HeldMarkers;
pub use reconcile::{PendingCreation, ReconcileOutcome, Reconciliation, ReconciliationOrchestrator};
