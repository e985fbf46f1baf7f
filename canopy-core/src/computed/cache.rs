//! Computed Cache
//!
//! Per-container memoization table for computed values.
//!
//! # How It Works
//!
//! 1. On first read, the computed function runs with a [`Tracker`]; the
//!    keys it reads become the entry's dependency set and the result is
//!    cached.
//!
//! 2. Later reads return the cached value while the entry is clean.
//!
//! 3. When keys change, every entry that depends on them, directly or
//!    through other computed entries, is dropped.
//!
//! 4. The next read recomputes.
//!
//! # Consistency
//!
//! The computed function runs without the cache lock held, since it may
//! read other computed keys. A patch can land while it runs. Each
//! invalidation bumps an epoch; a result is only cached if neither this
//! container's epoch nor any ancestor's changed since evaluation started.
//! Otherwise the value is returned to the reader but not stored.
//!
//! Ancestor epochs matter because an ancestor's patch reaches this cache
//! only after the ancestor has released its own locks, and a value read
//! from an uncached ancestor computed key leaves no edge to invalidate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::graph::DependencyGraph;
use crate::container::Container;
use crate::error::DefinitionError;
use crate::reactive::Tracker;
use crate::value::Value;

/// Cache state of a computed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// A cached value is available.
    Clean,

    /// No cached value: never read, or invalidated since the last read.
    Dirty,
}

/// A cached computed value and the keys it read.
#[derive(Debug, Clone)]
pub struct ComputedEntry {
    value: Value,
    dependencies: HashSet<String>,
}

impl ComputedEntry {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn dependencies(&self) -> &HashSet<String> {
        &self.dependencies
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, ComputedEntry>,
    graph: DependencyGraph,
}

#[derive(Default)]
pub(crate) struct ComputedCache {
    state: Mutex<CacheState>,

    /// Bumped on every invalidation.
    epoch: AtomicU64,

    /// Number of times any computed function has run.
    evaluations: AtomicU64,
}

impl ComputedCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get the value of `key`, evaluating it if no clean entry exists.
    ///
    /// `owner` must declare `key` as a computed key. `path` holds the
    /// computed keys already under evaluation in this read chain.
    pub(crate) fn get(
        &self,
        owner: &Container,
        key: &str,
        path: &[String],
    ) -> Result<Value, DefinitionError> {
        if let Some(entry) = self.state.lock().entries.get(key) {
            return Ok(entry.value.clone());
        }

        if path.iter().any(|k| k == key) {
            let mut cycle = path.to_vec();
            cycle.push(key.to_string());
            return Err(DefinitionError::ComputedCycle { path: cycle });
        }

        let Some(compute) = owner.template().computed(key).cloned() else {
            // Callers only route declared computed keys here
            return Ok(Value::Null);
        };

        let epoch = owner.chain_epoch();

        let mut chain = path.to_vec();
        chain.push(key.to_string());
        let tracker = Tracker::with_path(owner, chain);
        let value = compute(&tracker);
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let (dependencies, error) = tracker.into_parts();
        if let Some(err) = error {
            return Err(err);
        }

        let mut state = self.state.lock();
        if owner.chain_epoch() == epoch {
            state.graph.set_dependencies(key, dependencies.clone());
            state.entries.insert(
                key.to_string(),
                ComputedEntry {
                    value: value.clone(),
                    dependencies,
                },
            );
        } else {
            tracing::trace!(key, "state changed during evaluation; result not cached");
        }

        Ok(value)
    }

    /// Drop every entry affected by `changed` and return the dropped keys
    /// in topological order.
    ///
    /// `commit` runs under the cache lock before the entries are dropped,
    /// so no reader can take a stale entry between the state swap and the
    /// invalidation.
    pub(crate) fn invalidate_with<'a, I, F>(&self, changed: I, commit: F) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
        F: FnOnce(),
    {
        let mut state = self.state.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        commit();

        let affected = state.graph.affected(changed);
        let mut invalidated = Vec::with_capacity(affected.len());
        for key in affected {
            state.graph.remove(&key);
            if state.entries.remove(&key).is_some() {
                invalidated.push(key);
            }
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        invalidated
    }

    pub(crate) fn invalidate<'a, I>(&self, changed: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.invalidate_with(changed, || {})
    }

    /// Drop every entry.
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *state = CacheState::default();
    }

    pub(crate) fn entry_state(&self, key: &str) -> EntryState {
        if self.state.lock().entries.contains_key(key) {
            EntryState::Clean
        } else {
            EntryState::Dirty
        }
    }

    pub(crate) fn entry(&self, key: &str) -> Option<ComputedEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
