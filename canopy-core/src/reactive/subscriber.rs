//! Subscriber types for the change notifier.
//!
//! A subscriber is a mounted consumer of a container: typically a host UI
//! component. It reads through a [`Tracker`] so the notifier learns which
//! keys it depends on, and is signalled only when one of them changes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::container::Container;
use crate::value::Value;

use super::Tracker;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered subscriber.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    container: Container,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, container: Container) -> Self {
        Self { id, container }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Run one tracked consumption pass.
    ///
    /// The keys read through the tracker replace the subscriber's previous
    /// read-set. Until the first pass the subscriber receives no signals.
    ///
    /// Re-track after every signal. A computed key in the read-set is
    /// only reported again once it has been re-read: an invalidated entry
    /// keeps no dependency edges until it is evaluated anew.
    pub fn track<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Tracker<'_>) -> R,
    {
        let tracker = Tracker::new(&self.container);
        let result = f(&tracker);
        let (reads, error) = tracker.into_parts();

        if let Some(err) = error {
            tracing::error!(
                container = %self.container.id(),
                error = %err,
                "definition error during tracked read"
            );
        }

        self.container.notifier().set_read_set(self.id, reads);
        result
    }

    /// Read one key and add it to the read-set.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.container.notifier().add_read(self.id, key);
        self.container.get(key).unwrap_or_else(|err| {
            tracing::error!(
                container = %self.container.id(),
                key,
                error = %err,
                "definition error during tracked read"
            );
            None
        })
    }

    /// The keys read during the last pass, or `None` before the first one.
    pub fn read_set(&self) -> Option<HashSet<String>> {
        self.container.notifier().read_set(self.id)
    }

    /// The container this subscription observes.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Stop receiving signals. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.container.notifier().unregister(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("container", &self.container.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }
}
