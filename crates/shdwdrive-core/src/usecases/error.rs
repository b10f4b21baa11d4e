//! Orchestrator error types

use thiserror::Error;

use crate::domain::ActionKind;

/// Errors returned by [`ReconciliationOrchestrator`](super::ReconciliationOrchestrator)
///
/// A mutation whose request was accepted never fails with this type; how
/// its confirmation ended is reported by
/// [`ReconcileOutcome`](super::ReconcileOutcome).
#[derive(Debug, Error)]
pub enum DriveError {
    /// The request was refused locally; nothing was sent
    #[error("Cannot start {action} on {identifier}: {reason}")]
    Precondition {
        action: ActionKind,
        identifier: String,
        reason: String,
    },

    /// The storage provider rejected the request
    #[error("Failed to start {action} on {identifier}: {source:#}")]
    Initiation {
        action: ActionKind,
        identifier: String,
        source: anyhow::Error,
    },

    /// Some items of an upload batch were not confirmed
    #[error("Upload not confirmed for: {}", failed.join(", "))]
    PartialUpload { failed: Vec<String> },

    /// The session was torn down
    #[error("Session is closed")]
    SessionClosed,

    /// A read from the source of truth failed
    #[error("Read failed: {0:#}")]
    Read(#[source] anyhow::Error),
}

impl DriveError {
    /// Whether the operation was refused before any remote call
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, DriveError::Precondition { .. } | DriveError::SessionClosed)
    }
}
