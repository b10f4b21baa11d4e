//! Session context
//!
//! A [`Session`] scopes everything that belongs to one connected principal:
//! the local cache, the action tracker and the cancellation token every
//! poll loop derives from. Switching principal means tearing the session
//! down and initializing a new one with a fresh cache, so loops started by
//! the old session can never write into the new one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::cache::LocalCache;
use crate::domain::{OwnerAddress, SessionId};
use crate::tracker::{ActionTracker, DEFAULT_EVENT_CAPACITY};

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    owner: OwnerAddress,
    started_at: DateTime<Utc>,
    cache: Arc<LocalCache>,
    tracker: Arc<ActionTracker>,
    cancel: CancellationToken,
}

impl Session {
    /// Starts a session for `owner` with an empty cache
    pub fn init(owner: OwnerAddress) -> Self {
        Self::with_event_capacity(owner, DEFAULT_EVENT_CAPACITY)
    }

    /// Starts a session whose tracker buffers `event_capacity` changes
    pub fn with_event_capacity(owner: OwnerAddress, event_capacity: usize) -> Self {
        let session = Self {
            id: SessionId::new(),
            owner,
            started_at: Utc::now(),
            cache: Arc::new(LocalCache::new()),
            tracker: Arc::new(ActionTracker::new(event_capacity)),
            cancel: CancellationToken::new(),
        };
        tracing::info!(session = %session.id, owner = %session.owner, "Session started");
        session
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> &OwnerAddress {
        &self.owner
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ActionTracker> {
        &self.tracker
    }

    /// Token that every poll loop of this session is a child of
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancels every in-flight poll loop and drops pending markers
    ///
    /// Idempotent. The cache is left as-is for any reader still holding
    /// it; a new session never shares it.
    pub fn teardown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.tracker.clear_all();
        tracing::info!(session = %self.id, "Session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
