//! Container Runtime
//!
//! The runtime is the mount/unmount surface the host uses to create and
//! destroy container instances. It owns the configuration shared by the
//! instances it attaches and keeps a registry of live instances.
//!
//! # How It Works
//!
//! 1. `attach` invokes the template's initial state producer exactly once
//!    and builds an instance linked to the given parent.
//!
//! 2. `hydrate` does the same with a pre-built state record in place of
//!    the initial state producer.
//!
//! 3. `detach` unmounts an instance together with its whole subtree.
//!    Effects still in flight settle, but any patch they produce is
//!    dropped.
//!
//! The registry holds weak references, so an instance dropped by the host
//! without being detached simply disappears from it.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::config::RuntimeConfig;
use crate::container::{Container, ContainerId};
use crate::error::DefinitionError;
use crate::template::ContainerTemplate;
use crate::value::State;

type Registry = DashMap<ContainerId, Weak<crate::container::ContainerInner>>;

/// Mounts and unmounts container instances.
#[derive(Clone)]
pub struct Runtime {
    config: Arc<RuntimeConfig>,
    registry: Arc<Registry>,
}

impl Runtime {
    /// Create a runtime with the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Mount a new instance of `template` under `parent`.
    ///
    /// The initial state producer runs exactly once.
    pub fn attach(
        &self,
        template: &ContainerTemplate,
        parent: Option<&Container>,
    ) -> Result<Container, DefinitionError> {
        let seed = template.initial_state();
        self.mount(template, parent, seed)
    }

    /// Mount a new instance of `template` seeded with `state` instead of
    /// its initial state producer.
    pub fn hydrate(
        &self,
        template: &ContainerTemplate,
        parent: Option<&Container>,
        state: State,
    ) -> Result<Container, DefinitionError> {
        self.mount(template, parent, state)
    }

    fn mount(
        &self,
        template: &ContainerTemplate,
        parent: Option<&Container>,
        seed: State,
    ) -> Result<Container, DefinitionError> {
        template.validate_seed(&seed)?;
        self.prune();

        let container = Container::new(
            template.clone(),
            Arc::clone(&self.config),
            parent.cloned(),
            seed,
        );
        self.registry.insert(container.id(), container.downgrade());

        tracing::debug!(
            container = %container.id(),
            template = template.name(),
            parent = ?parent.map(Container::id),
            "attached"
        );

        Ok(container)
    }

    /// Unmount an instance and every live descendant.
    ///
    /// Returns `false` if it was already detached.
    pub fn detach(&self, container: &Container) -> bool {
        self.registry.remove(&container.id());

        let detached = container.detach();
        for id in &detached {
            self.registry.remove(id);
        }
        !detached.is_empty()
    }

    /// Drop registry entries of instances the host dropped without
    /// detaching.
    fn prune(&self) {
        self.registry.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Look up a live instance by ID.
    pub fn get(&self, id: ContainerId) -> Option<Container> {
        self.registry
            .get(&id)
            .and_then(|weak| weak.upgrade())
            .map(Container::from_inner)
            .filter(Container::is_mounted)
    }

    /// Number of live, mounted instances attached by this runtime.
    pub fn live_count(&self) -> usize {
        self.prune();
        self.registry
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .map(Container::from_inner)
            .filter(Container::is_mounted)
            .count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registered", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_template(calls: Arc<AtomicI32>) -> ContainerTemplate {
        ContainerTemplate::builder("counted")
            .initial_state(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                record([("count", json!(0))])
            })
            .computed("double", |_| json!(0))
            .build()
            .unwrap()
    }

    #[test]
    fn attach_runs_initial_state_once() {
        let calls = Arc::new(AtomicI32::new(0));
        let template = counting_template(calls.clone());
        let runtime = Runtime::default();

        let container = runtime.attach(&template, None).unwrap();
        container.snapshot();
        container.get_state("count");

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        runtime.attach(&template, None).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn hydrate_skips_initial_state() {
        let calls = Arc::new(AtomicI32::new(0));
        let template = counting_template(calls.clone());
        let runtime = Runtime::default();

        let container = runtime
            .hydrate(&template, None, record([("count", json!(41))]))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(container.get_state("count"), Some(json!(41)));
    }

    #[test]
    fn hydrate_rejects_computed_keys() {
        let template = counting_template(Arc::new(AtomicI32::new(0)));
        let err = Runtime::default()
            .hydrate(&template, None, record([("double", json!(1))]))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::KeyConflict { .. }));
    }

    #[test]
    fn registry_tracks_live_instances() {
        let template = counting_template(Arc::new(AtomicI32::new(0)));
        let runtime = Runtime::default();

        let a = runtime.attach(&template, None).unwrap();
        let b = runtime.attach(&template, Some(&a)).unwrap();
        assert_eq!(runtime.live_count(), 2);
        assert_eq!(runtime.get(b.id()), Some(b.clone()));

        assert!(runtime.detach(&b));
        assert!(!runtime.detach(&b));
        assert!(runtime.get(b.id()).is_none());
        assert_eq!(runtime.live_count(), 1);

        // `b` holds its parent alive
        drop(b);
        drop(a);
        assert_eq!(runtime.live_count(), 0);
    }

    #[test]
    fn detach_unmounts_subtree() {
        let template = counting_template(Arc::new(AtomicI32::new(0)));
        let runtime = Runtime::default();

        let root = runtime.attach(&template, None).unwrap();
        let mid = runtime.attach(&template, Some(&root)).unwrap();
        let leaf = runtime.attach(&template, Some(&mid)).unwrap();
        let sibling = runtime.attach(&template, Some(&root)).unwrap();

        assert!(runtime.detach(&mid));

        assert!(!mid.is_mounted());
        assert!(!leaf.is_mounted());
        assert!(root.is_mounted());
        assert!(sibling.is_mounted());
        assert!(runtime.get(leaf.id()).is_none());
        assert_eq!(runtime.live_count(), 2);
        assert_eq!(runtime.registry.len(), 2);
    }

    #[test]
    fn dropped_instances_are_pruned_on_attach() {
        let template = counting_template(Arc::new(AtomicI32::new(0)));
        let runtime = Runtime::default();

        for _ in 0..10 {
            runtime.attach(&template, None).unwrap();
        }
        let kept = runtime.attach(&template, None).unwrap();

        assert_eq!(runtime.registry.len(), 1);
        assert_eq!(runtime.get(kept.id()), Some(kept));
    }
}
