//! Reactive Storage
//!
//! Entities hold the data reactions read. This module covers the value
//! model, path handling, the per-entity subscription index, the query and
//! diff engines, computed (bound) entities with their sleep/wake
//! controller, and keyed collections.
//!
//! # Data Flow
//!
//! ```text
//!   reaction runs ──► Entity::get ──► ReactiveContext::track
//!                                            │
//!   reaction ends ◄── Entity::on ◄───────────┘
//!
//!   Entity::set ──► DiffPass over PathTree ──► Listener::trigger
//!                                                  │
//!                                    Scheduler::enqueue ──► drain
//! ```

mod bound;
mod collection;
mod diff;
mod entity;
mod path;
mod path_tree;
mod query;
mod sleep;
mod value;

pub use bound::{AbortHandle, AsyncSetter, BoundOptions};
pub use collection::Collection;
pub use entity::{Entity, WeakEntity};
pub use path::{parse_index, Path, SELF_SEGMENT};
pub use path_tree::{ListenerSet, PathTree};
pub use query::QueryFlags;
pub use sleep::has_view_listener;
pub use value::{Map, Value};
