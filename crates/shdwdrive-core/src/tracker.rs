//! Per-entity pending-action tracking
//!
//! The [`ActionTracker`] maps each [`EntityId`] to the set of
//! [`ActionKind`]s believed to be in flight for it. An entity with no
//! pending action has no entry. Every change to an entity's set is
//! published on a broadcast channel together with the resulting set.
//!
//! The tracker only drives UI affordances. Serializing mutations on one
//! entity is the job of [`EntityLocks`](crate::usecases::EntityLocks).

use std::collections::{BTreeSet, HashMap};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::{ActionKind, EntityId};

/// Default capacity of the change broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A change to one entity's pending set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub entity: EntityId,
    /// The entity's pending set after the change (empty once cleared)
    pub pending: BTreeSet<ActionKind>,
}

/// Concurrent map of entity → pending action kinds
#[derive(Debug)]
pub struct ActionTracker {
    pending: DashMap<EntityId, BTreeSet<ActionKind>>,
    events: broadcast::Sender<PendingChange>,
}

impl ActionTracker {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            pending: DashMap::new(),
            events,
        }
    }

    /// Marks `kind` as pending for `entity`
    ///
    /// Idempotent. Returns `true` if the set changed.
    pub fn mark_pending(&self, entity: &EntityId, kind: ActionKind) -> bool {
        let snapshot = {
            let mut set = self.pending.entry(entity.clone()).or_default();
            if !set.insert(kind) {
                return false;
            }
            set.clone()
        };
        tracing::debug!(entity = %entity, action = %kind, "Action pending");
        self.publish(entity, snapshot);
        true
    }

    /// Clears `kind` for `entity`, dropping the entry once its set is empty
    ///
    /// Returns `true` if the set changed.
    pub fn clear_pending(&self, entity: &EntityId, kind: ActionKind) -> bool {
        let snapshot = match self.pending.entry(entity.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get_mut().remove(&kind) {
                    return false;
                }
                let remaining = occupied.get().clone();
                if remaining.is_empty() {
                    occupied.remove();
                }
                remaining
            }
            Entry::Vacant(_) => return false,
        };
        tracing::debug!(entity = %entity, action = %kind, "Action cleared");
        self.publish(entity, snapshot);
        true
    }

    /// Atomically replaces `from` with `to` in the entity's set
    pub fn transition(&self, entity: &EntityId, from: ActionKind, to: ActionKind) {
        let snapshot = {
            let mut set = self.pending.entry(entity.clone()).or_default();
            let removed = set.remove(&from);
            let inserted = set.insert(to);
            if !removed && !inserted {
                return;
            }
            set.clone()
        };
        tracing::debug!(entity = %entity, from = %from, to = %to, "Action transitioned");
        self.publish(entity, snapshot);
    }

    /// Whether `entity` has any pending action, or the given one
    #[must_use]
    pub fn is_pending(&self, entity: &EntityId, kind: Option<ActionKind>) -> bool {
        self.pending.get(entity).is_some_and(|set| match kind {
            Some(kind) => set.contains(&kind),
            None => !set.is_empty(),
        })
    }

    /// The entity's pending set (empty if none)
    #[must_use]
    pub fn pending(&self, entity: &EntityId) -> BTreeSet<ActionKind> {
        self.pending
            .get(entity)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    /// Copy of every non-empty pending set
    #[must_use]
    pub fn snapshot(&self) -> HashMap<EntityId, BTreeSet<ActionKind>> {
        self.pending
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drops every pending set, publishing an empty set for each entity
    pub fn clear_all(&self) {
        let entities: Vec<EntityId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for entity in entities {
            if self.pending.remove(&entity).is_some() {
                self.publish(&entity, BTreeSet::new());
            }
        }
    }

    /// Subscribes to pending-set changes made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PendingChange> {
        self.events.subscribe()
    }

    fn publish(&self, entity: &EntityId, pending: BTreeSet<ActionKind>) {
        // No receivers is not an error
        let _ = self.events.send(PendingChange {
            entity: entity.clone(),
            pending,
        });
    }
}

impl Default for ActionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
