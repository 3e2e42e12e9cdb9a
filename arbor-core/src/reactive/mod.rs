//! Reactive Primitives
//!
//! This module implements dependency tracking and reactions: functions
//! that automatically re-run when the entity data they read changes.
//!
//! # Concepts
//!
//! ## Reactions
//!
//! A Reaction wraps a function. Every execution records which entity
//! paths the function read, and the reaction then subscribes to exactly
//! those paths. A change to any of them triggers the reaction again.
//!
//! ## Ownership
//!
//! Reactions created while another reaction is executing become its
//! children. Children are destroyed whenever the parent re-executes or is
//! destroyed, so nested bindings never outlive the code that made them.
//!
//! ## Listener contexts
//!
//! Entities notify [`Listener`]s. Reactions are listeners; external
//! consumers such as views can be too.
//!
//! # Implementation Notes
//!
//! Tracking uses a thread-local stack of frames (see [`ReactiveContext`]).
//! Everything here is single-threaded: handles are `Rc`-based and not
//! `Send`.

mod context;
mod id;
mod listener;
mod reaction;
mod runtime;

pub use context::{untracked, LookupEntry, Lookups, ReactiveContext};
pub use id::{EntityId, ListenerId};
pub use listener::{Consumer, Listener};
pub use reaction::{Owner, Reaction, WeakReaction};
pub use runtime::{autorun, autorun_with, priority, root, AutorunOptions};
