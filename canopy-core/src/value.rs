//! State Records
//!
//! Container state is a flat record: a mapping from key to a dynamically
//! typed value. Values are JSON values so that containers of different
//! templates can be composed into one tree and read through a single
//! merged view.
//!
//! Merging is shallow. A patch replaces top-level keys wholesale; nested
//! objects are never merged below the top level.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

/// A dynamically typed state value.
pub type Value = serde_json::Value;

/// A flat state record. Insertion order is preserved for stable debugging
/// output; it carries no semantic meaning.
pub type State = IndexMap<String, Value>;

/// Build a [`State`] record from key/value pairs.
///
/// ```rust
/// use canopy_core::{record, Value};
///
/// let state = record([("count", Value::from(1)), ("label", Value::from("hi"))]);
/// assert_eq!(state.len(), 2);
/// ```
pub fn record<K, I>(pairs: I) -> State
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Shallow-merge `patch` into `base`, producing the next state.
///
/// Keys present in the patch overwrite keys in the base; all other base
/// keys are carried over unchanged.
pub fn merge(base: &State, patch: &State) -> State {
    let mut next = base.clone();
    for (key, value) in patch {
        next.insert(key.clone(), value.clone());
    }
    next
}

/// The set of keys affected by one state change.
///
/// `state` holds the keys written by the patch; `computed` holds the
/// computed keys whose cached entries were invalidated as a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    state: SmallVec<[String; 4]>,
    computed: SmallVec<[String; 4]>,
}

impl ChangeSet {
    /// Create a change set from the keys of a patch.
    pub fn from_patch(patch: &State) -> Self {
        Self {
            state: patch.keys().cloned().collect(),
            computed: SmallVec::new(),
        }
    }

    pub(crate) fn from_keys<I>(state: I, computed: Vec<String>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            state: state.into_iter().collect(),
            computed: computed.into_iter().collect(),
        }
    }

    pub(crate) fn extend_computed<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        for key in keys {
            if !self.computed.contains(&key) {
                self.computed.push(key);
            }
        }
    }

    /// State keys written by the patch.
    pub fn state_keys(&self) -> &[String] {
        &self.state
    }

    /// Computed keys invalidated by the patch.
    pub fn computed_keys(&self) -> &[String] {
        &self.computed
    }

    /// Iterate over every changed key, state keys first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.state.iter().chain(self.computed.iter()).map(String::as_str)
    }

    /// Check whether `key` changed.
    pub fn contains(&self, key: &str) -> bool {
        self.iter().any(|k| k == key)
    }

    /// Check whether any key in `keys` changed.
    pub fn intersects(&self, keys: &HashSet<String>) -> bool {
        self.iter().any(|k| keys.contains(k))
    }

    /// Number of changed keys.
    pub fn len(&self) -> usize {
        self.state.len() + self.computed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty() && self.computed.is_empty()
    }
}

/// The settled result of an effect call.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectOutcome {
    /// The effect produced a transform; this is the owning container's
    /// state right after the patch was applied.
    State(Arc<State>),

    /// The effect resolved to a plain value and left state untouched.
    Value(Value),
}

impl EffectOutcome {
    /// The post-patch snapshot, if the effect changed state.
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::State(state) => Some(state),
            EffectOutcome::Value(_) => None,
        }
    }

    /// The side-effect value, if the effect did not change state.
    pub fn value(&self) -> Option<&Value> {
        match self {
            EffectOutcome::State(_) => None,
            EffectOutcome::Value(value) => Some(value),
        }
    }

    /// Decode one key of the post-patch snapshot.
    pub fn state_value<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.state()
            .and_then(|state| state.get(key))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_top_level_keys_only() {
        let base = record([("a", json!(1)), ("nested", json!({"x": 1, "y": 2}))]);
        let patch = record([("nested", json!({"x": 5}))]);

        let next = merge(&base, &patch);

        assert_eq!(next["a"], json!(1));
        // Nested objects are replaced, not merged
        assert_eq!(next["nested"], json!({"x": 5}));
    }

    #[test]
    fn merge_leaves_base_untouched() {
        let base = record([("a", json!(1))]);
        let patch = record([("a", json!(2)), ("b", json!(3))]);

        let next = merge(&base, &patch);

        assert_eq!(base["a"], json!(1));
        assert_eq!(next["a"], json!(2));
        assert_eq!(next["b"], json!(3));
    }

    #[test]
    fn change_set_intersection() {
        let patch = record([("a", json!(1))]);
        let mut changes = ChangeSet::from_patch(&patch);
        changes.extend_computed(vec!["double".to_string()]);

        let reads: HashSet<String> = ["double".to_string()].into_iter().collect();
        assert!(changes.intersects(&reads));

        let unrelated: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert!(!changes.intersects(&unrelated));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn outcome_decodes_state_values() {
        let outcome = EffectOutcome::State(Arc::new(record([("count", json!(3))])));
        assert_eq!(outcome.state_value::<i64>("count"), Some(3));
        assert!(outcome.value().is_none());
    }
}
