//! Per-entity mutation serialization
//!
//! [`EntityLocks`] hands out one async mutex per [`EntityId`]. A mutation
//! holds its entity's [`EntityGuard`] from before the remote call until its
//! reconciliation ends, so a second mutation on the same entity waits for
//! the first instead of racing it. Entries are dropped once nobody holds
//! or waits on them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::EntityId;

#[derive(Debug, Default, Clone)]
pub struct EntityLocks {
    locks: Arc<DashMap<EntityId, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `entity` is free and locks it
    pub async fn acquire(&self, entity: &EntityId) -> EntityGuard {
        let lock = Arc::clone(self.locks.entry(entity.clone()).or_default().value());
        let guard = lock.lock_owned().await;
        EntityGuard {
            entity: entity.clone(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }
}

/// Exclusive hold on one entity, released on drop
#[derive(Debug)]
pub struct EntityGuard {
    entity: EntityId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<EntityId, Arc<Mutex<()>>>>,
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left means no holder and no waiter
        self.locks
            .remove_if(&self.entity, |_, lock| Arc::strong_count(lock) == 1);
    }
}
