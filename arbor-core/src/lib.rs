//! Arbor Core
//!
//! This crate provides the reactive core of the Arbor data-binding
//! runtime. It implements:
//!
//! - Entities: reactive containers of nested data with per-path
//!   subscriptions
//! - Automatic dependency tracking for reactions
//! - Structural diffing, so deep-equal writes notify nobody
//! - A priority-ordered, deduplicating scheduler
//! - Demand-driven laziness (sleep/wake) for computed entities
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: entities, values, path trees, query and diff engines, bound
//!   entities, the sleep controller and keyed collections
//! - `reactive`: reactions, dependency tracking and `autorun`
//! - `scheduler`: the pending-reaction queue and drain loop
//! - `config`: per-thread runtime configuration
//!
//! The runtime is single-threaded: handles are `Rc`-based and all runtime
//! state is thread-local.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use arbor_core::{autorun, drain, Entity};
//!
//! let counter = Entity::new();
//! counter.set("count", 4);
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let seen_in_reaction = seen.clone();
//! let c = counter.clone();
//! let _reaction = autorun(move || {
//!     seen_in_reaction.set(c.get("count").as_f64().unwrap_or_default());
//! });
//!
//! counter.set("count", 5);
//! assert_eq!(seen.get(), 4.0);
//!
//! drain();
//! assert_eq!(seen.get(), 5.0);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod store;

pub use config::{RuntimeConfig, TickMode};
pub use error::{Error, Result};
pub use reactive::{
    autorun, autorun_with, priority, root, untracked, AutorunOptions, Consumer, EntityId,
    Listener, ListenerId, Reaction,
};
pub use scheduler::{drain, freeze, is_idle, unfreeze, Scheduler, TickDriver};
pub use store::{
    has_view_listener, AbortHandle, AsyncSetter, BoundOptions, Collection, Entity, QueryFlags,
    Value, WeakEntity,
};
