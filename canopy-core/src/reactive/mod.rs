//! Read Tracking and Change Notification
//!
//! This module implements the two halves of Canopy's fine-grained
//! reactivity: discovering which keys a computation or consumer reads, and
//! signalling consumers only when one of those keys changes.
//!
//! # Concepts
//!
//! ## Trackers
//!
//! A [`Tracker`] is an explicit accessor over a container's merged view.
//! Computed functions and subscribers read through it, and every read is
//! recorded. For a computed value the recorded set is its dependency set;
//! for a subscriber it is its read-set.
//!
//! ## Subscriptions
//!
//! A [`Subscription`] is a mounted consumer. It runs tracked passes with
//! [`Subscription::track`] and receives a [`ChangeSet`](crate::ChangeSet)
//! whenever a key in its read-set changes.
//!
//! # Implementation Notes
//!
//! Tracking is explicit: nothing is recorded unless the read goes through
//! a tracker. Plain reads such as [`Container::get`](crate::Container::get)
//! never establish dependencies.

mod notifier;
mod subscriber;
mod tracker;

pub(crate) use notifier::Notifier;
pub use notifier::ChangeCallback;
pub use subscriber::{SubscriberId, Subscription};
pub use tracker::Tracker;
