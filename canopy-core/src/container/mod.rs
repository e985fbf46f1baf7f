//! State Containers
//!
//! This module holds the live side of the runtime: container instances,
//! the merged effects view they expose, and the executor that runs
//! effects and applies their patches.
//!
//! # Overview
//!
//! A container tree is a set of [`Container`] instances linked child to
//! parent. Each instance:
//!
//! - owns its state record, replaced wholesale on every patch
//! - reads through to its ancestors for keys it does not define
//! - exposes its own and its ancestors' effects through an [`EffectsView`]
//! - caches its computed values and signals its subscribers on change
//!
//! State changes only through effects. There is no public write API.

mod executor;
mod instance;
mod view;

pub(crate) use instance::ContainerInner;
pub use instance::{Container, ContainerId};
pub use view::EffectsView;
