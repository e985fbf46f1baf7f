//! Change Notifier
//!
//! The notifier keeps, per container, the set of mounted subscribers and
//! the keys each one read during its last tracked pass.
//!
//! # How It Works
//!
//! 1. A subscriber registers a callback. It has no read-set yet.
//!
//! 2. The subscriber performs a tracked pass; the keys it read become its
//!    read-set.
//!
//! 3. After a patch, the container hands the notifier a [`ChangeSet`]:
//!    the patch keys plus any computed keys invalidated as a result.
//!
//! 4. Only subscribers whose read-set intersects the change set are
//!    signalled. Callbacks run after the observer table is released, so a
//!    callback may re-track or unsubscribe.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::subscriber::SubscriberId;
use crate::value::ChangeSet;

/// Callback invoked with the keys that changed.
pub type ChangeCallback = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

struct ObserverSlot {
    /// `None` until the first tracked read.
    read_set: Option<HashSet<String>>,
    callback: ChangeCallback,
}

#[derive(Default)]
pub(crate) struct Notifier {
    observers: DashMap<SubscriberId, ObserverSlot>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with no read-set.
    pub(crate) fn register(&self, id: SubscriberId, callback: ChangeCallback) {
        self.observers.insert(
            id,
            ObserverSlot {
                read_set: None,
                callback,
            },
        );
    }

    pub(crate) fn unregister(&self, id: SubscriberId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Replace a subscriber's read-set with the keys of its latest pass.
    pub(crate) fn set_read_set(&self, id: SubscriberId, reads: HashSet<String>) {
        if let Some(mut slot) = self.observers.get_mut(&id) {
            slot.read_set = Some(reads);
        }
    }

    /// Add one key to a subscriber's read-set, establishing it if needed.
    pub(crate) fn add_read(&self, id: SubscriberId, key: &str) {
        if let Some(mut slot) = self.observers.get_mut(&id) {
            slot.read_set
                .get_or_insert_with(HashSet::new)
                .insert(key.to_string());
        }
    }

    pub(crate) fn read_set(&self, id: SubscriberId) -> Option<HashSet<String>> {
        self.observers
            .get(&id)
            .and_then(|slot| slot.read_set.clone())
    }

    /// Signal every subscriber whose read-set intersects `changes`.
    ///
    /// Returns the number of subscribers signalled.
    pub(crate) fn notify(&self, changes: &ChangeSet) -> usize {
        if changes.is_empty() {
            return 0;
        }

        let to_signal: Vec<ChangeCallback> = self
            .observers
            .iter()
            .filter(|slot| {
                slot.read_set
                    .as_ref()
                    .is_some_and(|reads| changes.intersects(reads))
            })
            .map(|slot| Arc::clone(&slot.callback))
            .collect();

        // The observer table is no longer borrowed here
        for callback in &to_signal {
            callback(changes);
        }

        to_signal.len()
    }

    pub(crate) fn clear(&self) {
        self.observers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }
}
