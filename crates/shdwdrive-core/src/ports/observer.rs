//! Request observer port
//!
//! Receives a notification when a reconciliation is confirmed and when a
//! request fails (initiation error, partial upload, rejection or timeout).
//! Cancelled reconciliations are not reported.

use crate::domain::{ActionKind, EntityKind};

/// Port trait for request outcome notifications
///
/// Callbacks run on the reconciliation task and must not block.
pub trait IRequestObserver: Send + Sync {
    /// A mutation was confirmed by the read source
    fn on_success(&self, entity: EntityKind, action: ActionKind, identifier: &str);

    /// A mutation failed or could not be confirmed
    fn on_error(&self, entity: EntityKind, action: ActionKind, identifier: &str, message: &str);
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IRequestObserver for NoopObserver {
    fn on_success(&self, _entity: EntityKind, _action: ActionKind, _identifier: &str) {}

    fn on_error(&self, _entity: EntityKind, _action: ActionKind, _identifier: &str, _message: &str) {
    }
}
