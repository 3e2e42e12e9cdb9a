//! Sleep and Wake
//!
//! A bound entity with sleep enabled only recomputes while something that
//! ultimately matters (a view) observes it, directly or through a chain of
//! other bound entities. Unobserved entities go to sleep and skip their
//! computation entirely.
//!
//! Two walks implement this:
//!
//! - [`has_view_listener`] searches outward from an entity's subscribers,
//!   following each listener to the entity it computes or the reaction it
//!   was created under, until a view turns up.
//! - `wake` runs whenever an entity gains a subscriber. It restarts the
//!   entity if it was asleep, then repeats for everything the entity read
//!   on its last run.
//!
//! Both walks keep a visited set, so cyclic graphs terminate.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use super::path_tree::ListenerSet;
use super::Entity;
use crate::reactive::{Consumer, EntityId};

/// Whether a view is reachable from `entity`'s subscribers.
pub fn has_view_listener(entity: &Entity) -> bool {
    let mut visited = HashSet::new();
    let mut todo = VecDeque::from([entity.clone()]);

    while let Some(next) = todo.pop_front() {
        if !visited.insert(next.id()) {
            continue;
        }

        let mut listeners = ListenerSet::default();
        next.0.events.borrow().collect_all(&mut listeners);

        for listener in listeners.into_values() {
            let mut consumer = listener.consumer();
            loop {
                match consumer {
                    Consumer::View => return true,
                    Consumer::Entity(owner) => {
                        todo.push_back(owner);
                        break;
                    }
                    Consumer::Parent(parent) => consumer = parent.consumer(),
                    Consumer::Detached => break,
                }
            }
        }
    }

    false
}

/// Wake `entity` and, transitively, everything its computation read.
pub(crate) fn wake(entity: &Entity, woken: &mut HashSet<EntityId>) {
    woken.insert(entity.id());

    let Some(bound) = entity.bound_state() else {
        return;
    };
    if bound.sleeping.replace(false) {
        debug!(entity = %entity, "waking");
        bound.reset();
    }

    let upstream = bound
        .reaction()
        .map(|reaction| reaction.lookup_entities())
        .unwrap_or_default();
    for dependency in upstream {
        if woken.insert(dependency.id()) {
            wake(&dependency, woken);
        }
    }
}
