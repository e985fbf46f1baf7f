//! Read Tracking
//!
//! A [`Tracker`] is the accessor handed to computed functions and to
//! subscribers during a tracked pass. Every key read through it is
//! recorded; the recorded set becomes a computed entry's dependency set or
//! an observer's read-set.
//!
//! # Implementation
//!
//! The tracker is an explicit object rather than ambient thread-local
//! state. It also carries the chain of computed keys currently being
//! evaluated, which is how cycles between computed keys are caught: a key
//! that is already on the chain cannot be evaluated again.

use std::cell::RefCell;
use std::collections::HashSet;

use serde::de::DeserializeOwned;

use crate::container::Container;
use crate::error::DefinitionError;
use crate::value::Value;

/// Read-tracking accessor over a container's merged state and computed
/// view.
pub struct Tracker<'a> {
    source: &'a Container,

    /// Computed keys under evaluation, outermost first.
    path: Vec<String>,

    /// Keys read so far.
    reads: RefCell<HashSet<String>>,

    /// First definition error hit while reading, if any.
    error: RefCell<Option<DefinitionError>>,
}

impl<'a> Tracker<'a> {
    /// A tracker for a consumer pass (no computed evaluation in progress).
    pub(crate) fn new(source: &'a Container) -> Self {
        Self::with_path(source, Vec::new())
    }

    /// A tracker for evaluating the last key in `path`.
    pub(crate) fn with_path(source: &'a Container, path: Vec<String>) -> Self {
        Self {
            source,
            path,
            reads: RefCell::new(HashSet::new()),
            error: RefCell::new(None),
        }
    }

    /// Read a key through the merged view, recording the read.
    ///
    /// Returns `None` for keys that exist nowhere in the view. A computed
    /// key that fails to evaluate also reads as `None`; the error is kept
    /// and reported once the pass finishes.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.reads.borrow_mut().insert(key.to_string());

        match self.source.lookup(key, &self.path) {
            Ok(value) => value,
            Err(err) => {
                self.error.borrow_mut().get_or_insert(err);
                None
            }
        }
    }

    /// Read a key and decode it.
    ///
    /// The read is recorded even if the value is absent or fails to decode.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Keys read so far.
    pub fn reads(&self) -> HashSet<String> {
        self.reads.borrow().clone()
    }

    /// The first definition error hit during this pass.
    pub fn error(&self) -> Option<DefinitionError> {
        self.error.borrow().clone()
    }

    /// The container this tracker reads from.
    pub fn container(&self) -> &Container {
        self.source
    }

    pub(crate) fn into_parts(self) -> (HashSet<String>, Option<DefinitionError>) {
        (self.reads.into_inner(), self.error.into_inner())
    }
}

impl std::fmt::Debug for Tracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("container", &self.source.id())
            .field("path", &self.path)
            .field("reads", &self.reads.borrow().len())
            .finish()
    }
}
