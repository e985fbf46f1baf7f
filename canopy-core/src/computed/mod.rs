//! Computed Values
//!
//! Computed values are lazily evaluated, cached values derived from a
//! container's merged view. Each cached entry remembers exactly which keys
//! it read, and is dropped as soon as any of them changes.
//!
//! # Overview
//!
//! - `graph`: edges from keys to the computed entries that read them,
//!   used to find everything a change invalidates, transitively.
//! - `cache`: the per-container memoization table.
//!
//! # Design Decisions
//!
//! 1. Dependencies are discovered, not declared. A computed function that
//!    reads different keys on different runs gets a fresh dependency set
//!    each time it recomputes.
//!
//! 2. Cycles between computed keys are detected while evaluating, using
//!    the chain of keys under evaluation carried by the tracker, and are
//!    reported as [`DefinitionError::ComputedCycle`](crate::DefinitionError).
//!
//! 3. Evaluation is lazy. Invalidation only drops entries; nothing
//!    recomputes until it is read again.

mod cache;
mod graph;

pub(crate) use cache::ComputedCache;
pub use cache::{ComputedEntry, EntryState};
