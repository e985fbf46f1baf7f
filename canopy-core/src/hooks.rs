//! Middleware Hooks
//!
//! Middleware observes a container's effect invocations and patch
//! applications. Hooks are purely observational: they receive borrowed
//! event data, return nothing, and cannot alter or delay the executor's
//! outcome.

use std::sync::Arc;

use crate::container::ContainerId;
use crate::value::{State, Value};

/// Where an effect invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    /// The outer stage is about to run.
    Started,
    /// The call resolved, with or without a state change.
    Settled,
    /// The outer stage failed; state was not touched.
    Failed,
    /// The target was detached; the patch was dropped.
    Dropped,
}

/// An effect invocation event.
#[derive(Debug)]
pub struct EffectEvent<'a> {
    pub container: ContainerId,
    pub effect: &'a str,
    pub args: &'a [Value],
    pub phase: EffectPhase,
}

/// A patch application event.
#[derive(Debug)]
pub struct PatchEvent<'a> {
    pub container: ContainerId,
    /// The effect whose transform produced the patch.
    pub effect: &'a str,
    pub previous: &'a Arc<State>,
    pub next: &'a Arc<State>,
}

/// An observer of effect invocations and patch applications.
///
/// Both methods have empty default implementations.
pub trait Middleware: Send + Sync {
    fn on_effect(&self, _event: &EffectEvent<'_>) {}

    fn on_patch(&self, _event: &PatchEvent<'_>) {}
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn on_effect(&self, event: &EffectEvent<'_>) {
        (**self).on_effect(event)
    }

    fn on_patch(&self, event: &PatchEvent<'_>) {
        (**self).on_patch(event)
    }
}

/// Middleware that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn on_effect(&self, event: &EffectEvent<'_>) {
        tracing::debug!(
            container = %event.container,
            effect = event.effect,
            args = event.args.len(),
            phase = ?event.phase,
            "effect"
        );
    }

    fn on_patch(&self, event: &PatchEvent<'_>) {
        let changed: Vec<&str> = event
            .next
            .iter()
            .filter(|(key, value)| event.previous.get(*key) != Some(*value))
            .map(|(key, _)| key.as_str())
            .collect();

        tracing::debug!(
            container = %event.container,
            effect = event.effect,
            ?changed,
            "patch applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<EffectPhase>>,
    }

    impl Middleware for Recorder {
        fn on_effect(&self, event: &EffectEvent<'_>) {
            self.phases.lock().push(event.phase);
        }
    }

    #[test]
    fn default_methods_are_noops() {
        struct Silent;
        impl Middleware for Silent {}

        let previous = Arc::new(State::new());
        let next = Arc::new(record([("a", json!(1))]));
        Silent.on_patch(&PatchEvent {
            container: ContainerId::from(1),
            effect: "set",
            previous: &previous,
            next: &next,
        });
        TracingMiddleware.on_patch(&PatchEvent {
            container: ContainerId::from(1),
            effect: "set",
            previous: &previous,
            next: &next,
        });
    }

    #[test]
    fn arc_middleware_forwards() {
        let recorder = Arc::new(Recorder::default());
        let shared: Arc<Recorder> = recorder.clone();

        shared.on_effect(&EffectEvent {
            container: ContainerId::from(1),
            effect: "load",
            args: &[],
            phase: EffectPhase::Started,
        });

        assert_eq!(*recorder.phases.lock(), vec![EffectPhase::Started]);
    }
}
