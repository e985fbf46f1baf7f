//! Container Instances
//!
//! A [`Container`] is a live instance of a template: it owns a state
//! record, a computed cache and a change notifier, and links to its parent
//! instance, if any.
//!
//! # Composition
//!
//! Instances form a tree through explicit parent links. Reads that miss
//! locally fall through to the parent's merged view, so the nearest
//! definition of a key wins. Parents keep weak links to their children so
//! a patch can invalidate descendant computed entries and signal
//! descendant subscribers that read an inherited key.
//!
//! # Atomicity
//!
//! State is held as an `Arc<State>` and replaced wholesale on every patch.
//! A reader clones the `Arc`, so it sees either the whole previous record
//! or the whole next one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};

use super::executor::{self, Origin};
use super::view::EffectsView;
use crate::computed::{ComputedCache, ComputedEntry, EntryState};
use crate::config::RuntimeConfig;
use crate::error::{DefinitionError, EffectError};
use crate::hooks::{EffectEvent, EffectPhase, PatchEvent};
use crate::reactive::{Notifier, SubscriberId, Subscription};
use crate::template::{ContainerTemplate, EffectFn, TransformFn};
use crate::value::{merge, ChangeSet, EffectOutcome, State, Value};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    /// Generate a new unique container ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ContainerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The target of a patch was detached before it landed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StaleTarget;

pub(crate) struct ContainerInner {
    id: ContainerId,
    template: ContainerTemplate,
    config: Arc<RuntimeConfig>,
    parent: Option<Container>,

    /// Current state. Replaced, never mutated in place.
    state: RwLock<Arc<State>>,

    /// Serializes patch application so each transform sees the state left
    /// by the previous one.
    writer: Mutex<()>,

    /// Queue for externally dispatched effects in serialized mode.
    serial: tokio::sync::Mutex<()>,

    cache: ComputedCache,
    notifier: Notifier,
    children: Mutex<Vec<Weak<ContainerInner>>>,
    mounted: AtomicBool,
}

/// A live container instance.
///
/// Cloning a `Container` clones a handle; all clones share the instance.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub(crate) fn new(
        template: ContainerTemplate,
        config: Arc<RuntimeConfig>,
        parent: Option<Container>,
        seed: State,
    ) -> Self {
        let container = Self {
            inner: Arc::new(ContainerInner {
                id: ContainerId::new(),
                template,
                config,
                parent,
                state: RwLock::new(Arc::new(seed)),
                writer: Mutex::new(()),
                serial: tokio::sync::Mutex::new(()),
                cache: ComputedCache::new(),
                notifier: Notifier::new(),
                children: Mutex::new(Vec::new()),
                mounted: AtomicBool::new(true),
            }),
        };

        if let Some(parent) = &container.inner.parent {
            parent
                .inner
                .children
                .lock()
                .push(Arc::downgrade(&container.inner));
        }

        container
    }

    pub(crate) fn downgrade(&self) -> Weak<ContainerInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    /// The template this instance was built from.
    pub fn template(&self) -> &ContainerTemplate {
        &self.inner.template
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The nearest ancestor instance, or `None` at the root.
    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Number of ancestors above this instance.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Iterate over ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Container> {
        std::iter::successors(self.parent(), |c| c.parent())
    }

    /// Whether the instance is still mounted.
    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// This instance's own state record.
    pub fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.inner.state.read())
    }

    /// Read a state key through the merged state view.
    ///
    /// Own state wins; otherwise the nearest ancestor that holds the key.
    /// Returns `None` if no instance on the chain holds it.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        std::iter::once(self)
            .chain(self.ancestors())
            .find_map(|c| c.inner.state.read().get(key).cloned())
    }

    /// Read a key through the merged state and computed view.
    ///
    /// At each level, state is checked before computed values; the first
    /// level that defines the key wins.
    pub fn get(&self, key: &str) -> Result<Option<Value>, DefinitionError> {
        self.lookup(key, &[])
    }

    /// Read a computed key, evaluating it if needed.
    ///
    /// Resolves to the nearest instance declaring `key` as computed.
    pub fn get_computed(&self, key: &str) -> Result<Option<Value>, DefinitionError> {
        match std::iter::once(self)
            .chain(self.ancestors())
            .find(|c| c.template().has_computed(key))
        {
            Some(owner) => owner.inner.cache.get(owner, key, &[]).map(Some),
            None => Ok(None),
        }
    }

    /// The merged state view, materialized: every state key visible from
    /// this instance, nearest definition winning.
    pub fn merged_state(&self) -> State {
        let mut chain: Vec<&Container> = std::iter::once(self).chain(self.ancestors()).collect();
        chain.reverse();

        chain
            .into_iter()
            .fold(State::new(), |merged, c| merge(&merged, &c.snapshot()))
    }

    /// Cache state of one of this instance's own computed keys.
    pub fn computed_state(&self, key: &str) -> EntryState {
        self.inner.cache.entry_state(key)
    }

    /// The cached entry of one of this instance's own computed keys.
    pub fn computed_entry(&self, key: &str) -> Option<ComputedEntry> {
        self.inner.cache.entry(key)
    }

    /// Total number of computed evaluations on this instance.
    pub fn computed_evaluations(&self) -> u64 {
        self.inner.cache.evaluations()
    }

    /// Combined invalidation epoch of this instance and its ancestors.
    ///
    /// Epochs only grow, so the sum changes whenever any of them does.
    pub(crate) fn chain_epoch(&self) -> u64 {
        std::iter::once(self)
            .chain(self.ancestors())
            .map(|c| c.inner.cache.epoch())
            .fold(0, u64::wrapping_add)
    }

    pub(crate) fn lookup(
        &self,
        key: &str,
        path: &[String],
    ) -> Result<Option<Value>, DefinitionError> {
        if let Some(value) = self.inner.state.read().get(key) {
            return Ok(Some(value.clone()));
        }

        if self.template().has_computed(key) {
            return self.inner.cache.get(self, key, path).map(Some);
        }

        match &self.inner.parent {
            // Parents never read their children, so a cycle cannot span
            // levels; the parent starts a fresh evaluation chain.
            Some(parent) => parent.lookup(key, &[]),
            None => Ok(None),
        }
    }

    /// Whether this instance defines `key` itself, shadowing ancestors.
    pub(crate) fn shadows(&self, key: &str) -> bool {
        self.inner.state.read().contains_key(key) || self.template().has_computed(key)
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Invoke an effect by name through the merged effects view.
    ///
    /// The effect runs against the nearest instance that declares it. The
    /// returned future resolves once the outer stage has settled and any
    /// patch has been applied.
    pub fn dispatch(
        &self,
        effect: impl Into<String>,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<EffectOutcome, EffectError>> {
        executor::invoke(self.clone(), effect.into(), args, Origin::External)
    }

    /// The merged effects view of this instance.
    pub fn effects(&self) -> EffectsView {
        EffectsView::new(self.clone(), Origin::External)
    }

    /// Find the nearest instance declaring `effect`.
    pub(crate) fn resolve_effect(&self, effect: &str) -> Option<(Container, EffectFn)> {
        std::iter::once(self)
            .chain(self.ancestors())
            .find_map(|c| c.template().effect(effect).map(|f| (c.clone(), Arc::clone(f))))
    }

    /// Run `transform` against the current state and merge its result.
    ///
    /// Only the executor calls this, once an effect's outer stage has
    /// resolved to a transform.
    pub(crate) fn apply_transform(
        &self,
        effect: &str,
        transform: TransformFn,
    ) -> Result<Arc<State>, StaleTarget> {
        let (previous, next, changes) = {
            let _writer = self.inner.writer.lock();

            if !self.is_mounted() {
                return Err(StaleTarget);
            }

            let previous = self.snapshot();
            let patch = transform(&previous);
            let next = Arc::new(merge(&previous, &patch));

            let mut changes = ChangeSet::from_patch(&patch);
            let invalidated = self.inner.cache.invalidate_with(
                patch.keys().map(String::as_str),
                || *self.inner.state.write() = Arc::clone(&next),
            );
            changes.extend_computed(invalidated);

            (previous, next, changes)
        };

        for middleware in self.template().middleware() {
            middleware.on_patch(&PatchEvent {
                container: self.id(),
                effect,
                previous: &previous,
                next: &next,
            });
        }

        let signalled = self.inner.notifier.notify(&changes);
        tracing::trace!(
            container = %self.id(),
            effect,
            changed = changes.len(),
            signalled,
            "patch applied"
        );

        self.propagate(&changes);
        Ok(next)
    }

    /// Pass a change down to every live child, minus the keys it shadows.
    fn propagate(&self, changes: &ChangeSet) {
        let children: Vec<Container> = {
            let mut children = self.inner.children.lock();
            children.retain(|weak| weak.strong_count() > 0);
            children
                .iter()
                .filter_map(Weak::upgrade)
                .map(Container::from_inner)
                .collect()
        };

        for child in children {
            if !child.is_mounted() {
                continue;
            }

            let inherited: Vec<String> = changes
                .iter()
                .filter(|key| !child.shadows(key))
                .map(str::to_string)
                .collect();
            if inherited.is_empty() {
                continue;
            }

            let invalidated = child
                .inner
                .cache
                .invalidate(inherited.iter().map(String::as_str));
            let child_changes = ChangeSet::from_keys(inherited, invalidated);

            if child.config().notify_descendants {
                child.inner.notifier.notify(&child_changes);
            }
            child.propagate(&child_changes);
        }
    }

    pub(super) fn serial_queue(&self) -> &tokio::sync::Mutex<()> {
        &self.inner.serial
    }

    pub(crate) fn emit_effect(&self, effect: &str, args: &[Value], phase: EffectPhase) {
        for middleware in self.template().middleware() {
            middleware.on_effect(&EffectEvent {
                container: self.id(),
                effect,
                args,
                phase,
            });
        }
    }

    /// Log a call or patch that targeted a detached instance.
    pub(crate) fn report_stale(&self, effect: &str) {
        if self.config().warn_on_stale {
            tracing::warn!(container = %self.id(), effect, "container detached; patch dropped");
        } else {
            tracing::debug!(container = %self.id(), effect, "container detached; patch dropped");
        }
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Register a subscriber.
    ///
    /// The subscriber is signalled with the changed keys whenever a key it
    /// read during its last tracked pass changes. See
    /// [`Subscription::track`].
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.inner.notifier.register(id, Arc::new(on_change));
        Subscription::new(id, self.clone())
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.len()
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &ComputedCache {
        &self.inner.cache
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Unmount the instance and every live descendant.
    ///
    /// In-flight effects still settle, but their patches are dropped.
    /// Subscribers are released and computed caches are cleared. Returns
    /// the IDs of the instances unmounted by this call, this one first;
    /// empty if it was already detached.
    pub(crate) fn detach(&self) -> Vec<ContainerId> {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return Vec::new();
        }

        self.inner.notifier.clear();
        self.inner.cache.clear();

        if let Some(parent) = &self.inner.parent {
            let me = Arc::as_ptr(&self.inner);
            parent
                .inner
                .children
                .lock()
                .retain(|weak| weak.as_ptr() != me && weak.strong_count() > 0);
        }

        // Taken out before recursing; each child unlinks itself from us
        let children = std::mem::take(&mut *self.inner.children.lock());

        let mut detached = vec![self.id()];
        for child in children.iter().filter_map(Weak::upgrade) {
            detached.extend(Container::from_inner(child).detach());
        }

        tracing::debug!(
            container = %self.id(),
            template = self.template().name(),
            descendants = detached.len() - 1,
            "detached"
        );
        detached
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id())
            .field("template", &self.template().name())
            .field("parent", &self.parent().map(Container::id))
            .field("mounted", &self.is_mounted())
            .field("state", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Resolution;
    use crate::value::record;
    use crate::Runtime;
    use serde_json::json;

    fn template(name: &str, seed: State) -> ContainerTemplate {
        ContainerTemplate::builder(name)
            .initial_state(move || seed.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn container_ids_are_unique() {
        let id1 = ContainerId::new();
        let id2 = ContainerId::new();
        assert_ne!(id1, id2);
        assert_eq!(ContainerId::from(3).to_string(), "#3");
    }

    #[test]
    fn get_state_falls_through_to_ancestors() {
        let runtime = Runtime::default();
        let root = runtime
            .attach(&template("root", record([("theme", json!("dark"))])), None)
            .unwrap();
        let mid = runtime
            .attach(&template("mid", record([("user", json!("ana"))])), Some(&root))
            .unwrap();
        let leaf = runtime
            .attach(&template("leaf", State::new()), Some(&mid))
            .unwrap();

        assert_eq!(leaf.get_state("theme"), Some(json!("dark")));
        assert_eq!(leaf.get_state("user"), Some(json!("ana")));
        assert_eq!(leaf.get_state("missing"), None);
        assert_eq!(leaf.depth(), 2);
        assert!(root.is_root());
    }

    #[test]
    fn merged_state_prefers_nearest() {
        let runtime = Runtime::default();
        let root = runtime
            .attach(&template("root", record([("a", json!(1)), ("c", json!(0))])), None)
            .unwrap();
        let child = runtime
            .attach(&template("child", record([("a", json!(2)), ("b", json!(3))])), Some(&root))
            .unwrap();

        let merged = child.merged_state();
        assert_eq!(merged["a"], json!(2));
        assert_eq!(merged["b"], json!(3));
        assert_eq!(merged["c"], json!(0));
        assert_eq!(root.merged_state()["a"], json!(1));
    }

    #[test]
    fn transform_sees_current_state() {
        let runtime = Runtime::default();
        let container = runtime
            .attach(&template("counter", record([("count", json!(1))])), None)
            .unwrap();

        let add_one: TransformFn = Box::new(|state: &State| {
            let count = state["count"].as_i64().unwrap_or(0);
            record([("count", json!(count + 1))])
        });
        container.apply_transform("add", add_one).unwrap();

        let next = container.apply_transform("add", Box::new(|state: &State| {
            let count = state["count"].as_i64().unwrap_or(0);
            record([("count", json!(count * 10))])
        }));
        assert_eq!(next.unwrap()["count"], json!(20));
    }

    #[test]
    fn detached_container_rejects_patches() {
        let runtime = Runtime::default();
        let container = runtime
            .attach(&template("t", record([("a", json!(1))])), None)
            .unwrap();

        assert_eq!(container.detach(), vec![container.id()]);
        assert!(container.detach().is_empty());

        let result = container.apply_transform("set", Box::new(|_: &State| record([("a", json!(2))])));
        assert!(result.is_err());
        assert_eq!(container.snapshot()["a"], json!(1));
    }

    #[test]
    fn resolve_effect_prefers_nearest() {
        let runtime = Runtime::default();
        let parent_template = ContainerTemplate::builder("parent")
            .initial_state(State::new)
            .effect_sync("save", |_, _| Ok(Resolution::none()))
            .effect_sync("load", |_, _| Ok(Resolution::none()))
            .build()
            .unwrap();
        let child_template = ContainerTemplate::builder("child")
            .initial_state(State::new)
            .effect_sync("save", |_, _| Ok(Resolution::none()))
            .build()
            .unwrap();

        let parent = runtime.attach(&parent_template, None).unwrap();
        let child = runtime.attach(&child_template, Some(&parent)).unwrap();

        let (owner, _) = child.resolve_effect("save").unwrap();
        assert_eq!(owner, child);
        let (owner, _) = child.resolve_effect("load").unwrap();
        assert_eq!(owner, parent);
        assert!(child.resolve_effect("missing").is_none());
    }
}
