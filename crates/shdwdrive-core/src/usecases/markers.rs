//! Reference-counted pending markers
//!
//! With per-entity serialization off, two mutations on one entity can hold
//! the same marker at once (typically `polling`). [`HeldMarkers`] counts the
//! holders of each `(entity, kind)` pair and only touches the
//! [`ActionTracker`] when a pair gains its first holder or loses its last.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{ActionKind, EntityId};
use crate::tracker::ActionTracker;

#[derive(Debug, Clone)]
pub struct HeldMarkers {
    tracker: Arc<ActionTracker>,
    held: Arc<DashMap<EntityId, HashMap<ActionKind, usize>>>,
}

impl HeldMarkers {
    pub fn new(tracker: Arc<ActionTracker>) -> Self {
        Self {
            tracker,
            held: Arc::new(DashMap::new()),
        }
    }

    /// Adds a holder of `kind`, marking it on the first
    pub fn hold(&self, entity: &EntityId, kind: ActionKind) {
        let mut held = self.held.entry(entity.clone()).or_default();
        if increment(&mut held, kind) {
            self.tracker.mark_pending(entity, kind);
        }
    }

    /// Moves one holder from `from` to `to`
    ///
    /// When both markers change the tracker sees a single transition.
    pub fn swap(&self, entity: &EntityId, from: ActionKind, to: ActionKind) {
        let mut held = self.held.entry(entity.clone()).or_default();
        let cleared = decrement(&mut held, from);
        let marked = increment(&mut held, to);
        match (cleared, marked) {
            (true, true) => self.tracker.transition(entity, from, to),
            (true, false) => {
                self.tracker.clear_pending(entity, from);
            }
            (false, true) => {
                self.tracker.mark_pending(entity, to);
            }
            (false, false) => {}
        }
    }

    /// Drops a holder of `kind`, clearing it with the last one
    pub fn release(&self, entity: &EntityId, kind: ActionKind) {
        if let Entry::Occupied(mut held) = self.held.entry(entity.clone()) {
            // Cleared under the entry lock; a concurrent `hold` waits for it
            if decrement(held.get_mut(), kind) {
                self.tracker.clear_pending(entity, kind);
            }
            if held.get().is_empty() {
                held.remove();
            }
        }
    }
}

/// Returns `true` when `kind` gained its first holder
fn increment(held: &mut HashMap<ActionKind, usize>, kind: ActionKind) -> bool {
    let count = held.entry(kind).or_insert(0);
    *count += 1;
    *count == 1
}

/// Returns `true` when `kind` lost its last holder
fn decrement(held: &mut HashMap<ActionKind, usize>, kind: ActionKind) -> bool {
    match held.get_mut(&kind) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        Some(_) => {
            held.remove(&kind);
            true
        }
        None => false,
    }
}
