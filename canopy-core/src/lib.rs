//! Canopy Core
//!
//! This crate provides the runtime for Canopy, a hierarchical state
//! container library. It implements:
//!
//! - Container templates: initial state, named async effects, computed
//!   values and middleware hooks
//! - Container instances composed into trees, where each instance sees
//!   the merged state, computed values and effects of its ancestors
//! - Memoized computed values with automatic dependency tracking
//! - Fine-grained change notification for mounted consumers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `template`: Immutable container schemas and their builder
//! - `container`: Live instances, the merged effects view and the effect
//!   executor
//! - `computed`: Per-instance memoization and the dependency graph
//! - `reactive`: Read tracking and subscriber notification
//! - `hooks`: Middleware observing effect lifecycles and patches
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_core::{record, ContainerTemplate, Resolution, Runtime};
//! use serde_json::json;
//!
//! let counter = ContainerTemplate::builder("counter")
//!     .initial_state(|| record([("count", json!(0))]))
//!     .effect_sync("increment", |_, _| {
//!         Ok(Resolution::transform(|state| {
//!             let count = state["count"].as_i64().unwrap_or(0);
//!             record([("count", json!(count + 1))])
//!         }))
//!     })
//!     .computed("double", |t| json!(t.get_as::<i64>("count").unwrap_or(0) * 2))
//!     .build()?;
//!
//! let runtime = Runtime::default();
//! let container = runtime.attach(&counter, None)?;
//!
//! container.dispatch("increment", vec![]).await?;
//! assert_eq!(container.get_computed("double")?, Some(json!(2)));
//! ```

pub mod computed;
pub mod config;
pub mod container;
pub mod error;
pub mod hooks;
pub mod reactive;
mod runtime;
pub mod template;
pub mod value;

pub use computed::{ComputedEntry, EntryState};
pub use config::{EffectMode, RuntimeConfig};
pub use container::{Container, ContainerId, EffectsView};
pub use error::{BoxError, DefinitionError, EffectError};
pub use hooks::{EffectEvent, EffectPhase, Middleware, PatchEvent, TracingMiddleware};
pub use reactive::{SubscriberId, Subscription, Tracker};
pub use runtime::Runtime;
pub use template::{ContainerTemplate, Resolution, TemplateBuilder};
pub use value::{merge, record, ChangeSet, EffectOutcome, State, Value};
