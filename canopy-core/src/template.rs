//! Container Templates
//!
//! A [`ContainerTemplate`] is the immutable schema a container instance is
//! built from: an initial state producer, a set of named effects, a set of
//! named computed values, and any middleware hooks.
//!
//! Templates are built once per container type with [`TemplateBuilder`]
//! and shared cheaply (cloning a template clones an `Arc`).
//!
//! # Effects
//!
//! An effect is an async function of the merged effects view and the call
//! arguments. It resolves to a [`Resolution`]:
//!
//! - [`Resolution::Transform`]: a function from the state current at
//!   resolution time to a partial record, shallow-merged into state.
//! - [`Resolution::Value`]: no state change; the call resolves with the
//!   value.
//!
//! Synchronous effects declared with [`TemplateBuilder::effect_sync`] are
//! wrapped in a ready future, so every effect is awaited the same way.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;

use crate::container::EffectsView;
use crate::error::{BoxError, DefinitionError};
use crate::hooks::Middleware;
use crate::reactive::Tracker;
use crate::value::{State, Value};

/// Produces a container's initial state. Invoked once per attach.
pub type InitialStateFn = Arc<dyn Fn() -> State + Send + Sync>;

/// The future returned by an effect's outer stage.
pub type EffectFuture = BoxFuture<'static, Result<Resolution, BoxError>>;

/// An effect function.
pub type EffectFn = Arc<dyn Fn(EffectsView, Vec<Value>) -> EffectFuture + Send + Sync>;

/// A computed function. Reads go through the tracker so they are recorded
/// as the entry's dependency set.
pub type ComputedFn = Arc<dyn Fn(&Tracker<'_>) -> Value + Send + Sync>;

/// A state transform produced by an effect.
pub type TransformFn = Box<dyn FnOnce(&State) -> State + Send>;

/// What an effect's outer stage resolved to.
pub enum Resolution {
    /// Apply this transform to the current state and merge the result.
    Transform(TransformFn),

    /// Leave state unchanged and resolve the call with this value.
    Value(Value),
}

impl Resolution {
    /// Resolve with a transform of the current state.
    pub fn transform<F>(f: F) -> Self
    where
        F: FnOnce(&State) -> State + Send + 'static,
    {
        Resolution::Transform(Box::new(f))
    }

    /// Resolve with a fixed patch, independent of current state.
    pub fn patch(patch: State) -> Self {
        Resolution::Transform(Box::new(move |_: &State| patch))
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Resolution::Value(value.into())
    }

    /// Resolve with no state change and a null value.
    pub fn none() -> Self {
        Resolution::Value(Value::Null)
    }

    pub fn is_transform(&self) -> bool {
        matches!(self, Resolution::Transform(_))
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Transform(_) => f.write_str("Transform(..)"),
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<Value> for Resolution {
    fn from(value: Value) -> Self {
        Resolution::Value(value)
    }
}

struct TemplateInner {
    name: String,
    initial_state: InitialStateFn,
    effects: IndexMap<String, EffectFn>,
    computed: IndexMap<String, ComputedFn>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Immutable schema from which container instances are built.
#[derive(Clone)]
pub struct ContainerTemplate {
    inner: Arc<TemplateInner>,
}

impl ContainerTemplate {
    /// Start building a template with the given type name.
    pub fn builder(name: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder {
            name: name.into(),
            initial_state: None,
            effects: IndexMap::new(),
            computed: IndexMap::new(),
            middleware: Vec::new(),
        }
    }

    /// The template's type name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn initial_state(&self) -> State {
        (self.inner.initial_state)()
    }

    /// Look up an effect declared directly on this template.
    pub fn effect(&self, name: &str) -> Option<&EffectFn> {
        self.inner.effects.get(name)
    }

    /// Look up a computed function declared directly on this template.
    pub fn computed(&self, key: &str) -> Option<&ComputedFn> {
        self.inner.computed.get(key)
    }

    pub fn has_computed(&self, key: &str) -> bool {
        self.inner.computed.contains_key(key)
    }

    /// Names of the effects declared on this template.
    pub fn effect_names(&self) -> impl Iterator<Item = &str> {
        self.inner.effects.keys().map(String::as_str)
    }

    /// Names of the computed keys declared on this template.
    pub fn computed_keys(&self) -> impl Iterator<Item = &str> {
        self.inner.computed.keys().map(String::as_str)
    }

    pub(crate) fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.inner.middleware
    }

    /// Check that a seed state does not collide with computed keys.
    pub(crate) fn validate_seed(&self, seed: &State) -> Result<(), DefinitionError> {
        match seed.keys().find(|key| self.has_computed(key)) {
            Some(key) => Err(DefinitionError::KeyConflict {
                template: self.inner.name.clone(),
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ContainerTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerTemplate")
            .field("name", &self.inner.name)
            .field("effects", &self.inner.effects.keys().collect::<Vec<_>>())
            .field("computed", &self.inner.computed.keys().collect::<Vec<_>>())
            .field("middleware_count", &self.inner.middleware.len())
            .finish()
    }
}

/// Builder for [`ContainerTemplate`].
///
/// ```rust,ignore
/// let counter = ContainerTemplate::builder("counter")
///     .initial_state(|| record([("count", json!(0))]))
///     .effect_sync("increment", |_, _| {
///         Ok(Resolution::transform(|state| {
///             let count = state["count"].as_i64().unwrap_or(0);
///             record([("count", json!(count + 1))])
///         }))
///     })
///     .computed("double", |t| json!(t.get_as::<i64>("count").unwrap_or(0) * 2))
///     .build()?;
/// ```
pub struct TemplateBuilder {
    name: String,
    initial_state: Option<InitialStateFn>,
    effects: IndexMap<String, EffectFn>,
    computed: IndexMap<String, ComputedFn>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl TemplateBuilder {
    /// Set the initial state producer.
    pub fn initial_state<F>(mut self, f: F) -> Self
    where
        F: Fn() -> State + Send + Sync + 'static,
    {
        self.initial_state = Some(Arc::new(f));
        self
    }

    /// Declare an asynchronous effect.
    pub fn effect<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EffectsView, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolution, BoxError>> + Send + 'static,
    {
        let effect: EffectFn = Arc::new(move |view, args| f(view, args).boxed());
        self.effects.insert(name.into(), effect);
        self
    }

    /// Declare an effect whose outer stage completes synchronously.
    pub fn effect_sync<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EffectsView, Vec<Value>) -> Result<Resolution, BoxError> + Send + Sync + 'static,
    {
        let effect: EffectFn = Arc::new(move |view, args| future::ready(f(view, args)).boxed());
        self.effects.insert(name.into(), effect);
        self
    }

    /// Declare a computed value.
    pub fn computed<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Tracker<'_>) -> Value + Send + Sync + 'static,
    {
        self.computed.insert(key.into(), Arc::new(f));
        self
    }

    /// Attach a middleware hook.
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Validate and build the template.
    pub fn build(self) -> Result<ContainerTemplate, DefinitionError> {
        let template = self.name;

        if template.is_empty() {
            return Err(DefinitionError::EmptyName {
                template,
                kind: "template",
            });
        }

        let Some(initial_state) = self.initial_state else {
            return Err(DefinitionError::MissingInitialState { template });
        };

        if self.effects.keys().any(String::is_empty) {
            return Err(DefinitionError::EmptyName {
                template,
                kind: "effect",
            });
        }
        if self.computed.keys().any(String::is_empty) {
            return Err(DefinitionError::EmptyName {
                template,
                kind: "computed key",
            });
        }

        Ok(ContainerTemplate {
            inner: Arc::new(TemplateInner {
                name: template,
                initial_state,
                effects: self.effects,
                computed: self.computed,
                middleware: self.middleware,
            }),
        })
    }
}
