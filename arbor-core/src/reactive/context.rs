//! Reactive Context
//!
//! The reactive context tracks which reaction is currently running and
//! records every (entity, path) pair it reads. This is what lets a
//! reaction subscribe to exactly the data it used without declaring
//! anything up front.
//!
//! # Implementation
//!
//! We use a thread-local stack. Executing a reaction pushes a frame with
//! a fresh, empty set of lookups; the frame is popped when the guard
//! returned by [`ReactiveContext::enter`] is dropped, so nesting restores
//! the enclosing reaction's frame exactly, even when the reaction panics.
//!
//! Untracked reads push a frame that keeps the current reaction (so
//! reactions created inside still find their parent) but records nothing.

use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};

use super::{EntityId, Reaction};
use crate::store::Entity;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The reaction executing in this frame, if any.
    reaction: Option<Reaction>,
    /// Reads recorded in this frame. `None` for untracked frames.
    lookups: Option<Lookups>,
}

/// Paths read from one entity during one execution.
#[derive(Clone)]
pub struct LookupEntry {
    pub entity: Entity,
    pub paths: IndexSet<String>,
}

impl LookupEntry {
    /// The paths to subscribe to. A read of the whole value subsumes
    /// every narrower read.
    pub fn subscription_paths(&self) -> Vec<String> {
        if self.paths.contains("") {
            vec![String::new()]
        } else {
            self.paths.iter().cloned().collect()
        }
    }
}

/// Everything a reaction read during its last execution, keyed by entity.
#[derive(Clone, Default)]
pub struct Lookups {
    entries: IndexMap<EntityId, LookupEntry>,
}

impl Lookups {
    pub fn record(&mut self, entity: &Entity, path: String) {
        self.entries
            .entry(entity.id())
            .or_insert_with(|| LookupEntry {
                entity: entity.clone(),
                paths: IndexSet::new(),
            })
            .paths
            .insert(path);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LookupEntry> {
        self.entries.values()
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.entries.values().map(|entry| entry.entity.clone()).collect()
    }

    pub fn contains(&self, entity: &Entity, path: &str) -> bool {
        self.entries
            .get(&entity.id())
            .is_some_and(|entry| entry.paths.contains(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Guard that pops its frame when dropped.
pub struct ReactiveContext {
    depth: usize,
}

impl ReactiveContext {
    /// Enter a new tracking frame for the given reaction.
    pub fn enter(reaction: Reaction) -> Self {
        Self::push(ContextEntry {
            reaction: Some(reaction),
            lookups: Some(Lookups::default()),
        })
    }

    /// Enter a frame in which reads are not recorded.
    pub fn untracked() -> Self {
        let reaction = Self::current_reaction();
        Self::push(ContextEntry {
            reaction,
            lookups: None,
        })
    }

    fn push(entry: ContextEntry) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(entry);
            stack.len()
        });
        Self { depth }
    }

    /// Check if reads are currently being recorded.
    pub fn is_tracking() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.lookups.is_some())
        })
    }

    /// The reaction currently executing, if any.
    pub fn current_reaction() -> Option<Reaction> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.reaction.clone())
        })
    }

    /// Record a read of `path` on `entity` into the innermost frame.
    pub fn track(entity: &Entity, path: &[String]) {
        CONTEXT_STACK.with(|stack| {
            if let Some(lookups) = stack
                .borrow_mut()
                .last_mut()
                .and_then(|entry| entry.lookups.as_mut())
            {
                lookups.record(entity, path.join("."));
            }
        });
    }

    /// Take the lookups recorded so far in this guard's frame.
    pub fn take_lookups(&self) -> Lookups {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .get_mut(self.depth - 1)
                .and_then(|entry| entry.lookups.as_mut())
                .map(std::mem::take)
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext dropped out of order"
            );
            stack.truncate(self.depth - 1);
        });
    }
}

/// Run `f` without recording any reads into the current reaction.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}
