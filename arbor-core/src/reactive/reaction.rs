//! Reaction Implementation
//!
//! A Reaction wraps a function and re-runs it whenever any data it read
//! during its last run changes.
//!
//! # How Reactions Work
//!
//! 1. `execute()` drops every subscription from the previous run and
//!    destroys the child reactions created by it.
//!
//! 2. The function runs inside a fresh tracking frame, so every entity
//!    read is recorded.
//!
//! 3. When the function returns (or unwinds), the reaction subscribes to
//!    exactly the recorded paths. A drop guard performs this step, which
//!    keeps subscriptions and lookups in agreement even after a panic.
//!
//! 4. A change to any subscribed path calls `trigger()`, which usually
//!    enqueues the reaction into the scheduler.
//!
//! # Ownership
//!
//! Parents own their children; a child only holds a weak link back.
//! Path trees hold weak links to reactions too, so the last strong handle
//! going away tears the reaction down and removes its subscriptions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use tracing::{debug, trace};

use super::context::{Lookups, ReactiveContext};
use super::listener::{Consumer, Listener};
use super::ListenerId;
use crate::config;
use crate::scheduler::Scheduler;
use crate::store::{Entity, WeakEntity};

/// What a reaction computes on behalf of.
#[derive(Clone)]
pub enum Owner {
    /// The reaction feeds a terminal consumer.
    View,
    /// The reaction computes this entity's value.
    Entity(WeakEntity),
}

/// A function that re-runs when the data it read changes.
#[derive(Clone)]
pub struct Reaction(pub(crate) Rc<ReactionInner>);

/// A non-owning handle to a reaction.
#[derive(Clone)]
pub struct WeakReaction(Weak<ReactionInner>);

pub(crate) struct ReactionInner {
    id: ListenerId,
    name: Option<String>,
    run: Rc<dyn Fn()>,
    priority: Cell<i32>,
    immediate: bool,
    owner: Option<Owner>,
    this: Weak<ReactionInner>,
    parent: RefCell<Weak<ReactionInner>>,
    children: RefCell<Vec<Reaction>>,
    lookups: RefCell<Lookups>,
    destroyed: Cell<bool>,
    run_count: Cell<usize>,
}

impl Reaction {
    pub(crate) fn new(
        run: Rc<dyn Fn()>,
        priority: i32,
        immediate: bool,
        owner: Option<Owner>,
        name: Option<String>,
    ) -> Self {
        Self(Rc::new_cyclic(|this| ReactionInner {
            id: ListenerId::next(),
            name,
            run,
            priority: Cell::new(priority),
            immediate,
            owner,
            this: this.clone(),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            lookups: RefCell::new(Lookups::default()),
            destroyed: Cell::new(false),
            run_count: Cell::new(0),
        }))
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> ListenerId {
        self.0.id
    }

    /// Diagnostic name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Scheduling priority. Higher runs sooner.
    pub fn priority(&self) -> i32 {
        self.0.priority.get()
    }

    /// Whether `trigger()` executes synchronously.
    pub fn is_immediate(&self) -> bool {
        self.0.immediate
    }

    /// Check if the reaction has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Number of times the wrapped function has been called.
    pub fn run_count(&self) -> usize {
        self.0.run_count.get()
    }

    /// The enclosing reaction this one was created under, if still alive.
    pub fn parent(&self) -> Option<Reaction> {
        self.0.parent.borrow().upgrade().map(Reaction)
    }

    /// Number of live child reactions from the last execution.
    pub fn children_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    /// Whether the last execution read `path` on `entity`.
    pub fn depends_on(&self, entity: &Entity, path: &str) -> bool {
        self.0.lookups.borrow().contains(entity, path)
    }

    /// Entities read during the last execution.
    pub fn lookup_entities(&self) -> Vec<Entity> {
        self.0.lookups.borrow().entities()
    }

    /// This reaction as a listener context for manual subscriptions.
    pub fn as_listener(&self) -> Rc<dyn Listener> {
        self.0.clone()
    }

    pub fn downgrade(&self) -> WeakReaction {
        WeakReaction(Rc::downgrade(&self.0))
    }

    pub(crate) fn adopt(&self, child: &Reaction) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    /// Run the wrapped function, re-recording its dependencies.
    ///
    /// Panics raised by the function propagate to the caller after the
    /// reaction has re-subscribed to whatever it read before failing.
    pub fn execute(&self) {
        let inner = &self.0;
        if inner.destroyed.get() {
            return;
        }

        inner.unsubscribe_all();
        inner.destroy_children();

        let _scope = ExecutionScope {
            reaction: self,
            context: Some(ReactiveContext::enter(self.clone())),
            started: Instant::now(),
        };
        let run = Rc::clone(&inner.run);
        run();
    }

    /// Request a re-execution.
    pub fn trigger(&self) {
        if self.0.destroyed.get() {
            return;
        }
        if self.0.immediate {
            self.execute();
        } else {
            Scheduler::enqueue(self);
        }
    }

    /// Tear the reaction down for good.
    ///
    /// Idempotent, and safe while the reaction is still queued: the queued
    /// entry becomes a no-op.
    pub fn destroy(&self) {
        let inner = &self.0;
        if inner.destroyed.replace(true) {
            return;
        }
        *inner.parent.borrow_mut() = Weak::new();
        inner.unsubscribe_all();
        inner.destroy_children();
    }
}

impl ReactionInner {
    fn unsubscribe_all(&self) {
        let lookups = std::mem::take(&mut *self.lookups.borrow_mut());
        for entry in lookups.iter() {
            for path in entry.subscription_paths() {
                entry.entity.off(&path, self.id);
            }
        }
    }

    fn destroy_children(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.destroy();
        }
    }
}

impl Listener for ReactionInner {
    fn listener_id(&self) -> ListenerId {
        self.id
    }

    fn trigger(&self) {
        if let Some(this) = self.this.upgrade() {
            Reaction(this).trigger();
        }
    }

    fn consumer(&self) -> Consumer {
        match &self.owner {
            Some(Owner::View) => Consumer::View,
            Some(Owner::Entity(entity)) => match entity.upgrade() {
                Some(entity) => Consumer::Entity(entity),
                None => Consumer::Detached,
            },
            None => match self.parent.borrow().upgrade() {
                Some(parent) => Consumer::Parent(parent as Rc<dyn Listener>),
                None => Consumer::Detached,
            },
        }
    }
}

impl Drop for ReactionInner {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// Finishes an execution: subscribes to the recorded lookups and pops
/// the tracking frame. Runs on both return and unwind.
struct ExecutionScope<'a> {
    reaction: &'a Reaction,
    context: Option<ReactiveContext>,
    started: Instant,
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        let inner = &self.reaction.0;
        let lookups = match self.context.take() {
            Some(context) => context.take_lookups(),
            None => Lookups::default(),
        };
        inner.run_count.set(inner.run_count.get() + 1);

        if !inner.destroyed.get() {
            let listener = self.reaction.as_listener();
            for entry in lookups.iter() {
                for path in entry.subscription_paths() {
                    entry.entity.on(&path, Rc::clone(&listener));
                }
            }
            *inner.lookups.borrow_mut() = lookups;
        }

        let elapsed = self.started.elapsed();
        trace!(
            reaction = %self.reaction,
            priority = inner.priority.get(),
            elapsed_us = elapsed.as_micros() as u64,
            "executed"
        );
        let slow_ms = config::with(|c| c.slow_execution_ms);
        if elapsed.as_millis() as u64 > slow_ms {
            debug!(
                reaction = %self.reaction,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow execution"
            );
        }
    }
}

impl WeakReaction {
    pub fn upgrade(&self) -> Option<Reaction> {
        self.0.upgrade().map(Reaction)
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Reaction {}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0.id),
        }
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("priority", &self.priority())
            .field("run_count", &self.run_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
