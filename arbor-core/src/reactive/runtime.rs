//! Reactive Runtime
//!
//! Entry points that tie reactions to the tracking context: `autorun`
//! creates a reaction, wires it under the enclosing reaction (if any) and
//! runs it once; `root` hands out the per-thread root entity.

use std::rc::Rc;

use tracing::warn;

use super::context::ReactiveContext;
use super::reaction::{Owner, Reaction};
use crate::store::Entity;

/// Standard scheduling priorities. Higher runs sooner.
pub mod priority {
    /// Top-level `autorun` calls.
    pub const DEFAULT_AUTORUN: i32 = 4000;
    /// Bound (computed) entities.
    pub const BOUND: i32 = 3000;
    /// Work that must settle before views render.
    pub const BEFORE_VIEWS: i32 = 2500;
    /// Views.
    pub const VIEW: i32 = 2000;
    /// Work that should observe rendered views.
    pub const AFTER_VIEWS: i32 = 1500;
    /// Async entities.
    pub const ASYNC: i32 = 1000;
    pub const LOWEST: i32 = 0;
}

/// Options for [`autorun_with`].
#[derive(Clone, Default)]
pub struct AutorunOptions {
    priority: Option<i32>,
    detached: bool,
    immediate: bool,
    deferred: bool,
    owner: Option<Owner>,
    name: Option<String>,
}

impl AutorunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit priority. Defaults to one below the enclosing reaction,
    /// or [`priority::DEFAULT_AUTORUN`] at the top level.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Do not register as a child of the enclosing reaction.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Execute synchronously on every trigger instead of enqueueing.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Enqueue the first execution instead of running it now.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Mark the reaction as feeding a terminal consumer.
    pub fn view(mut self) -> Self {
        self.owner = Some(Owner::View);
        self
    }

    /// Mark the reaction as computing `entity`.
    pub fn owned_by(mut self, entity: &Entity) -> Self {
        self.owner = Some(Owner::Entity(entity.downgrade()));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Run `f` now and again whenever anything it read changes.
///
/// Dropping every handle to the returned reaction tears it down, unless
/// it was created inside another reaction, which then owns it.
#[must_use = "dropping a top-level Reaction unsubscribes it"]
pub fn autorun<F>(f: F) -> Reaction
where
    F: Fn() + 'static,
{
    autorun_with(AutorunOptions::default(), f)
}

/// [`autorun`] with explicit options.
#[must_use = "dropping a top-level Reaction unsubscribes it"]
pub fn autorun_with<F>(options: AutorunOptions, f: F) -> Reaction
where
    F: Fn() + 'static,
{
    let enclosing = ReactiveContext::current_reaction();
    let priority = options.priority.unwrap_or_else(|| {
        enclosing
            .as_ref()
            .map_or(priority::DEFAULT_AUTORUN, |parent| parent.priority() - 1)
    });

    if options.immediate && !options.detached && enclosing.is_some() {
        warn!(
            name = options.name.as_deref().unwrap_or("<anonymous>"),
            "immediate reaction created as a child; it may run after its parent destroys it"
        );
    }

    let reaction = Reaction::new(
        Rc::new(f),
        priority,
        options.immediate,
        options.owner,
        options.name,
    );

    if !options.detached {
        if let Some(parent) = &enclosing {
            parent.adopt(&reaction);
        }
    }

    if options.deferred {
        reaction.trigger();
    } else {
        reaction.execute();
    }

    reaction
}

thread_local! {
    static ROOT: Entity = Entity::named("root");
}

/// The per-thread root entity.
pub fn root() -> Entity {
    ROOT.with(Entity::clone)
}
