//! Merged Effects View
//!
//! The view handed to every effect's outer stage. It exposes the effects
//! of the instance and of all its ancestors, nearest definition winning,
//! and runs each one against the instance that declares it.

use std::collections::HashSet;

use futures_util::future::BoxFuture;

use super::executor::{self, Origin};
use super::instance::Container;
use crate::error::EffectError;
use crate::value::{EffectOutcome, Value};

/// Merged effects view of a container instance.
#[derive(Clone)]
pub struct EffectsView {
    container: Container,
    origin: Origin,
}

impl EffectsView {
    pub(crate) fn new(container: Container, origin: Origin) -> Self {
        Self { container, origin }
    }

    /// Invoke an effect by name.
    ///
    /// Resolves through the merged view: an effect declared on this
    /// instance shadows an ancestor effect with the same name. The effect
    /// runs against the instance that declares it.
    ///
    /// Awaiting the returned future is a synchronization point: once it
    /// resolves, the invoked effect's patch has been applied.
    pub fn call(
        &self,
        effect: impl Into<String>,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<EffectOutcome, EffectError>> {
        executor::invoke(self.container.clone(), effect.into(), args, self.origin)
    }

    /// Whether `effect` is reachable through this view.
    pub fn has(&self, effect: &str) -> bool {
        self.container.resolve_effect(effect).is_some()
    }

    /// Every reachable effect name, own effects first, then each ancestor's
    /// effects not already shadowed.
    pub fn names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(&self.container)
            .chain(self.container.ancestors())
            .flat_map(|c| c.template().effect_names())
            .filter(|name| seen.insert(name.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Untracked read through the merged state and computed view.
    ///
    /// A computed key that fails to evaluate reads as `None` and the error
    /// is logged.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.container.get(key).unwrap_or_else(|err| {
            tracing::error!(
                container = %self.container.id(),
                key,
                error = %err,
                "definition error during effect read"
            );
            None
        })
    }

    /// The instance this view belongs to.
    pub fn container(&self) -> &Container {
        &self.container
    }
}

impl std::fmt::Debug for EffectsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectsView")
            .field("container", &self.container.id())
            .field("effects", &self.names())
            .finish()
    }
}
