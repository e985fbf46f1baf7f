//! Error Types
//!
//! Errors fall into two groups:
//!
//! - [`DefinitionError`]: a template or computed definition is malformed.
//!   These surface to whoever builds the template, attaches it, or reads
//!   the offending computed key.
//! - [`EffectError`]: a single effect invocation failed. Only that
//!   invocation's future is rejected; the container and the rest of the
//!   tree keep working.

use thiserror::Error;

use crate::container::ContainerId;

/// Boxed error type returned by user-supplied effect functions.
///
/// Any `std::error::Error + Send + Sync` converts into it with `?`,
/// including [`EffectError`] from awaiting another effect.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A configuration-time error in a template or computed definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The template was built without an initial state producer.
    #[error("template `{template}` has no initial state producer")]
    MissingInitialState { template: String },

    /// An effect, computed key, or template was given an empty name.
    #[error("template `{template}` declares a {kind} with an empty name")]
    EmptyName { template: String, kind: &'static str },

    /// A computed key is also present in the container's own state.
    #[error("template `{template}`: key `{key}` is both a state key and a computed key")]
    KeyConflict { template: String, key: String },

    /// Computed keys depend on each other in a cycle.
    ///
    /// `path` lists the keys in evaluation order, ending with the key
    /// that closed the cycle.
    #[error("computed dependency cycle: {}", path.join(" -> "))]
    ComputedCycle { path: Vec<String> },
}

/// A runtime failure of one effect invocation.
#[derive(Debug, Error)]
pub enum EffectError {
    /// No effect with this name exists in the merged effects view.
    #[error("container {container}: no effect named `{effect}`")]
    UnknownEffect { container: ContainerId, effect: String },

    /// The target container was detached before or during the call.
    /// Any patch the call would have produced has been dropped.
    #[error("container {container} is detached; effect `{effect}` dropped")]
    Detached { container: ContainerId, effect: String },

    /// The effect's outer stage failed. State was left unchanged.
    #[error("effect `{effect}` on container {container} failed: {source}")]
    Rejected {
        container: ContainerId,
        effect: String,
        #[source]
        source: BoxError,
    },
}

impl EffectError {
    /// The name of the effect that failed.
    pub fn effect(&self) -> &str {
        match self {
            EffectError::UnknownEffect { effect, .. }
            | EffectError::Detached { effect, .. }
            | EffectError::Rejected { effect, .. } => effect,
        }
    }

    /// The container the failed call targeted.
    pub fn container(&self) -> ContainerId {
        match self {
            EffectError::UnknownEffect { container, .. }
            | EffectError::Detached { container, .. }
            | EffectError::Rejected { container, .. } => *container,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, EffectError::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = DefinitionError::ComputedCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "computed dependency cycle: a -> b -> a");
    }

    #[test]
    fn rejected_keeps_source() {
        let err = EffectError::Rejected {
            container: ContainerId::from(7),
            effect: "load".into(),
            source: "network down".into(),
        };
        assert!(err.is_rejected());
        assert_eq!(err.effect(), "load");
        assert_eq!(err.container(), ContainerId::from(7));
        assert!(std::error::Error::source(&err).is_some());
    }
}
