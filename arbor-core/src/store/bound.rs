//! Bound Entities
//!
//! A bound entity computes its whole value from a state function. The
//! function runs inside a reaction owned by the entity, so it re-runs
//! whenever anything it read changes, and each result is written into the
//! entity through the normal diffing write path.
//!
//! # Sleep
//!
//! With sleep enabled, the entity checks for a reachable view before each
//! recompute and skips the state function when there is none. A new
//! subscriber wakes it again (see [`super::sleep`]).
//!
//! # Async Entities
//!
//! An async state function receives an [`AsyncSetter`] instead of
//! returning a value, and may hand back an [`AbortHandle`] for the work it
//! started. Every recompute starts a new generation; a setter from an
//! older generation is ignored, so a slow stale response never overwrites
//! a newer one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::query::{QueryFlags, WriteOrigin};
use super::sleep::has_view_listener;
use super::value::Value;
use super::{Entity, WeakEntity};
use crate::reactive::{autorun_with, priority, AutorunOptions, Reaction};

/// Options for bound and async entities.
#[derive(Clone, Debug, Default)]
pub struct BoundOptions {
    priority: Option<i32>,
    sleep_enabled: bool,
    assume_changed: bool,
    name: Option<String>,
}

impl BoundOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduling priority of the entity's reaction. Defaults to
    /// [`priority::BOUND`], or [`priority::ASYNC`] for async entities.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Skip recomputes while no view observes the entity.
    pub fn sleep(mut self) -> Self {
        self.sleep_enabled = true;
        self
    }

    /// Notify listeners after every recompute, even if nothing changed.
    pub fn assume_changed(mut self) -> Self {
        self.assume_changed = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Cancels an in-flight async computation.
pub struct AbortHandle(Box<dyn FnOnce()>);

impl AbortHandle {
    pub fn new(abort: impl FnOnce() + 'static) -> Self {
        Self(Box::new(abort))
    }

    fn abort(self) {
        (self.0)()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle")
    }
}

/// Delivers the result of one async computation.
#[derive(Clone)]
pub struct AsyncSetter {
    entity: WeakEntity,
    generation: u64,
}

impl AsyncSetter {
    /// Whether this setter still belongs to the latest computation.
    pub fn is_current(&self) -> bool {
        self.entity
            .upgrade()
            .and_then(|entity| entity.bound_state())
            .is_some_and(|bound| bound.generation.get() == self.generation)
    }

    /// Write `value` into the entity. Returns `false`, writing nothing,
    /// if a newer computation has started since this one.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let Some(entity) = self.entity.upgrade() else {
            return false;
        };
        let Some(bound) = entity.bound_state() else {
            return false;
        };
        if bound.generation.get() != self.generation {
            trace!(entity = %entity, generation = self.generation, "stale async result dropped");
            return false;
        }
        bound.settled.set(true);
        bound.abort.borrow_mut().take();
        entity.write(&[], Some(value.into()), QueryFlags::NONE, WriteOrigin::Internal);
        true
    }
}

type SyncState = Rc<dyn Fn() -> Value>;
type AsyncState = Rc<dyn Fn(AsyncSetter) -> Option<AbortHandle>>;

enum Source {
    Sync(SyncState),
    Async(AsyncState),
}

/// The computation behind a bound entity.
pub(crate) struct BoundState {
    source: Source,
    assume_changed: bool,
    pub(super) sleep_enabled: Cell<bool>,
    pub(super) sleeping: Cell<bool>,
    reaction: RefCell<Option<Reaction>>,
    generation: Cell<u64>,
    settled: Cell<bool>,
    abort: RefCell<Option<AbortHandle>>,
}

impl BoundState {
    fn new(source: Source, options: &BoundOptions) -> Self {
        Self {
            source,
            assume_changed: options.assume_changed,
            sleep_enabled: Cell::new(options.sleep_enabled),
            sleeping: Cell::new(false),
            reaction: RefCell::new(None),
            generation: Cell::new(0),
            settled: Cell::new(true),
            abort: RefCell::new(None),
        }
    }

    pub(crate) fn reaction(&self) -> Option<Reaction> {
        self.reaction.borrow().clone()
    }

    pub(crate) fn reset(&self) {
        if let Some(reaction) = self.reaction() {
            reaction.trigger();
        }
    }

    pub(crate) fn abort_previous(&self) {
        let abort = self.abort.borrow_mut().take();
        if let Some(abort) = abort {
            abort.abort();
        }
    }

    pub(crate) fn destroy(&self) {
        let reaction = self.reaction.borrow_mut().take();
        if let Some(reaction) = reaction {
            reaction.destroy();
        }
        self.generation.set(self.generation.get() + 1);
        self.abort_previous();
    }
}

impl Entity {
    /// Create an entity whose value is `state()`, kept up to date.
    pub fn bound<F, V>(state: F) -> Entity
    where
        F: Fn() -> V + 'static,
        V: Into<Value>,
    {
        Self::bound_with(BoundOptions::default(), state)
    }

    /// [`Entity::bound`] with explicit options.
    pub fn bound_with<F, V>(options: BoundOptions, state: F) -> Entity
    where
        F: Fn() -> V + 'static,
        V: Into<Value>,
    {
        let source = Source::Sync(Rc::new(move || state().into()));
        Self::spawn_bound(source, options, priority::BOUND)
    }

    /// Create an entity filled asynchronously.
    ///
    /// `state` starts the work and passes the result to the setter when
    /// it arrives. It may return an abort callback for that work.
    pub fn bound_async<F>(options: BoundOptions, state: F) -> Entity
    where
        F: Fn(AsyncSetter) -> Option<AbortHandle> + 'static,
    {
        Self::spawn_bound(Source::Async(Rc::new(state)), options, priority::ASYNC)
    }

    /// Store a new bound entity computing `state()` at `path`.
    pub fn bind<F, V>(&self, path: &str, state: F) -> Entity
    where
        F: Fn() -> V + 'static,
        V: Into<Value>,
    {
        let options = BoundOptions::new().named(path);
        let bound = Self::bound_with(options, state);
        self.set(path, &bound);
        bound
    }

    fn spawn_bound(source: Source, options: BoundOptions, default_priority: i32) -> Entity {
        let entity = Entity::with_bound(BoundState::new(source, &options), options.name.clone());
        let weak = entity.downgrade();

        let mut reaction_options = AutorunOptions::new()
            .detached()
            .priority(options.priority.unwrap_or(default_priority))
            .owned_by(&entity);
        if let Some(name) = &options.name {
            reaction_options = reaction_options.named(format!("bound:{name}"));
        }

        let reaction = autorun_with(reaction_options, move || {
            if let Some(entity) = weak.upgrade() {
                entity.recompute();
            }
        });
        if let Some(bound) = entity.bound_state() {
            *bound.reaction.borrow_mut() = Some(reaction);
        }
        entity
    }

    fn recompute(&self) {
        let Some(bound) = self.bound_state() else {
            return;
        };

        let sleeping = bound.sleep_enabled.get() && !has_view_listener(self);
        if sleeping && !bound.sleeping.get() {
            debug!(entity = %self, "sleeping");
        }
        bound.sleeping.set(sleeping);
        if sleeping {
            return;
        }

        match &bound.source {
            Source::Sync(state) => {
                let value = state();
                let flags = if bound.assume_changed {
                    QueryFlags::ASSUME_CHANGED
                } else {
                    QueryFlags::NONE
                };
                self.write(&[], Some(value), flags, WriteOrigin::Internal);
            }
            Source::Async(state) => {
                let generation = bound.generation.get() + 1;
                bound.generation.set(generation);
                bound.settled.set(false);

                let setter = AsyncSetter {
                    entity: self.downgrade(),
                    generation,
                };
                let abort = state(setter);
                if bound.generation.get() == generation && !bound.settled.get() {
                    *bound.abort.borrow_mut() = abort;
                }
            }
        }
    }
}
