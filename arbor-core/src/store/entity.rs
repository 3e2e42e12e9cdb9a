//! Entity Implementation
//!
//! An Entity is the unit of reactive storage: a value tree plus a path
//! tree of subscriptions on it.
//!
//! # How Entities Work
//!
//! 1. Reads (`get`, `query`) return data and, inside a running reaction,
//!    record which path was read.
//!
//! 2. When the reaction finishes, it subscribes to those paths with `on`.
//!
//! 3. Writes (`set`, the mutation helpers) replace the value along the
//!    written path and diff old against new to find the listeners whose
//!    data really changed. Those listeners are triggered.
//!
//! Mutation helpers read through `read_silent`, so a reaction that pushes
//! onto a list does not start depending on that list.
//!
//! # Handles
//!
//! `Entity` is a cheap `Rc` handle; clones refer to the same entity.
//! [`WeakEntity`] is the non-owning form used for back-references.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::bound::BoundState;
use super::path::Path;
use super::path_tree::{ListenerSet, PathTree};
use super::query::{QueryFlags, WriteOrigin};
use super::sleep;
use super::value::Value;
use crate::reactive::{EntityId, Listener, ListenerId, Reaction};

/// A reactive data container.
#[derive(Clone)]
pub struct Entity(pub(crate) Rc<EntityInner>);

/// A non-owning handle to an entity.
#[derive(Clone, Default)]
pub struct WeakEntity(Weak<EntityInner>);

pub(crate) struct EntityInner {
    pub(super) id: OnceCell<EntityId>,
    pub(super) name: RefCell<Option<String>>,
    pub(super) value: RefCell<Value>,
    pub(super) events: RefCell<PathTree>,
    pub(super) bound: OnceCell<Rc<BoundState>>,
    pub(super) destroyed: Cell<bool>,
}

impl EntityInner {
    fn new(name: Option<String>, value: Value) -> Self {
        Self {
            id: OnceCell::new(),
            name: RefCell::new(name),
            value: RefCell::new(value),
            events: RefCell::new(PathTree::new()),
            bound: OnceCell::new(),
            destroyed: Cell::new(false),
        }
    }
}

impl Entity {
    /// Create an empty entity.
    pub fn new() -> Self {
        Self(Rc::new(EntityInner::new(None, Value::Null)))
    }

    /// Create an empty entity with a diagnostic name.
    pub fn named(name: impl Into<String>) -> Self {
        Self(Rc::new(EntityInner::new(Some(name.into()), Value::Null)))
    }

    /// Create an entity holding `value`.
    pub fn with_value(value: impl Into<Value>) -> Self {
        Self(Rc::new(EntityInner::new(None, value.into())))
    }

    /// Create an entity, assign its identity and run `init` on it.
    pub fn make(init: impl FnOnce(&Entity)) -> Self {
        let entity = Self::new();
        entity.id();
        init(&entity);
        entity
    }

    pub(super) fn with_bound(state: BoundState, name: Option<String>) -> Self {
        let inner = EntityInner::new(name, Value::Null);
        let _ = inner.bound.set(Rc::new(state));
        Self(Rc::new(inner))
    }

    /// The entity's process-unique id, assigned on first use.
    pub fn id(&self) -> EntityId {
        *self.0.id.get_or_init(EntityId::next)
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.0.name.borrow_mut() = Some(name.into());
    }

    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity(Rc::downgrade(&self.0))
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub(crate) fn bound_state(&self) -> Option<Rc<BoundState>> {
        self.0.bound.get().cloned()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe `listener` to changes at `path`.
    ///
    /// Gaining a subscriber wakes this entity, and everything it reads,
    /// if it was sleeping.
    pub fn on(&self, path: &str, listener: Rc<dyn Listener>) {
        let path = Path::parse(path);
        self.0
            .events
            .borrow_mut()
            .insert(path.segments(), &listener);
        sleep::wake(self, &mut HashSet::new());
    }

    /// Remove `listener` from `path`.
    pub fn off(&self, path: &str, listener: ListenerId) {
        let path = Path::parse(path);
        self.0
            .events
            .borrow_mut()
            .remove(path.segments(), listener);
    }

    /// Trigger every listener registered exactly at `path`.
    pub fn trigger(&self, path: &str) {
        let path = Path::parse(path);
        let mut listeners = ListenerSet::default();
        if let Some(node) = self.0.events.borrow().node(path.segments()) {
            node.collect_self(&mut listeners);
        }
        for listener in listeners.into_values() {
            listener.trigger();
        }
    }

    pub fn has_listener(&self, path: &str, listener: ListenerId) -> bool {
        let path = Path::parse(path);
        self.0.events.borrow().contains(path.segments(), listener)
    }

    /// Number of live (path, listener) subscriptions on this entity.
    pub fn listener_count(&self) -> usize {
        self.0.events.borrow().listener_count()
    }

    // ------------------------------------------------------------------
    // Mutation helpers
    // ------------------------------------------------------------------

    /// Remove the value at `path`.
    pub fn unset(&self, path: &str) {
        self.query(path, QueryFlags::UNSET, None);
    }

    /// Replace the whole value with `Null`.
    pub fn clear(&self) {
        self.set("", Value::Null);
    }

    /// Negate the truthiness of the value at `path`.
    pub fn toggle(&self, path: &str) {
        let current = self.read_silent(path);
        self.set(path, !current.is_truthy());
    }

    /// Add `delta` to the number at `path`. Anything else counts as zero.
    pub fn increment(&self, path: &str, delta: f64) {
        let current = self.read_silent(path).as_f64().unwrap_or(0.0);
        self.set(path, current + delta);
    }

    /// Append to the sequence at `path`.
    pub fn push(&self, path: &str, value: impl Into<Value>) {
        let value = value.into();
        self.update_seq(path, |items| items.push(value));
    }

    /// Prepend to the sequence at `path`.
    pub fn unshift(&self, path: &str, value: impl Into<Value>) {
        let value = value.into();
        self.update_seq(path, |items| items.insert(0, value));
    }

    /// Remove and return the first element of the sequence at `path`.
    pub fn remove_first(&self, path: &str) -> Option<Value> {
        if self.seq_is_empty(path) {
            return None;
        }
        let mut removed = None;
        self.update_seq(path, |items| removed = Some(items.remove(0)));
        removed
    }

    /// Remove and return the last element of the sequence at `path`.
    pub fn remove_last(&self, path: &str) -> Option<Value> {
        if self.seq_is_empty(path) {
            return None;
        }
        let mut removed = None;
        self.update_seq(path, |items| removed = items.pop());
        removed
    }

    fn seq_is_empty(&self, path: &str) -> bool {
        self.read_silent(path).as_seq().map_or(true, <[Value]>::is_empty)
    }

    fn update_seq(&self, path: &str, f: impl FnOnce(&mut Vec<Value>)) {
        let mut items = match self.read_silent(path) {
            Value::Seq(items) => items,
            Value::Null => Rc::default(),
            other => {
                warn!(
                    entity = %self,
                    path,
                    found = %other,
                    "sequence operation on a non-sequence; replacing it"
                );
                Rc::default()
            }
        };
        f(Rc::make_mut(&mut items));
        self.set(path, Value::Seq(items));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear the entity down: stop its computation, abort pending async
    /// work and unset its value. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        if let Some(bound) = self.bound_state() {
            bound.destroy();
        }
        self.write(&[], None, QueryFlags::UNSET, WriteOrigin::Internal);
    }

    // ------------------------------------------------------------------
    // Bound entities
    // ------------------------------------------------------------------

    /// Whether this entity is computed from a state function.
    pub fn is_bound(&self) -> bool {
        self.0.bound.get().is_some()
    }

    /// Whether this bound entity skipped its last recompute for lack of
    /// observers.
    pub fn is_sleeping(&self) -> bool {
        self.0.bound.get().is_some_and(|bound| bound.sleeping.get())
    }

    /// The reaction computing this entity, if it is bound.
    pub fn reaction(&self) -> Option<Reaction> {
        self.0.bound.get().and_then(|bound| bound.reaction())
    }

    /// Re-run this entity's computation on the next drain.
    pub fn reset(&self) {
        if let Some(bound) = self.bound_state() {
            bound.reset();
        }
    }

    /// Turn off laziness and wake the entity.
    pub fn disable_sleep(&self) {
        let Some(bound) = self.bound_state() else {
            return;
        };
        if bound.sleep_enabled.replace(false) {
            warn!(entity = %self, "disabling sleep");
            sleep::wake(self, &mut HashSet::new());
        }
    }

    /// Invoke the abort callback of the pending async request, if any.
    pub fn abort_previous(&self) {
        if let Some(bound) = self.bound_state() {
            bound.abort_previous();
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.0.upgrade().map(Entity)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Entity {}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.name.borrow() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.id()),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("name", &*self.0.name.borrow())
            .field("bound", &self.is_bound())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
