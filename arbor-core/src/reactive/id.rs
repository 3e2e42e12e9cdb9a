//! Identifiers for entities and listener contexts.
//!
//! Both kinds of id come from one process-wide counter, so an id never
//! collides across the two namespaces.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

fn next_raw() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for an entity.
///
/// Entities receive their id lazily, the first time something needs it
/// (a dependency record, a wake traversal, a log line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Generate a new unique entity ID.
    pub fn next() -> Self {
        Self(next_raw())
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Unique identifier for a listener context (a reaction or a view).
///
/// Used to key listener maps in path trees and to deduplicate the
/// scheduler queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn next() -> Self {
        Self(next_raw())
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_kinds() {
        let e1 = EntityId::next();
        let l1 = ListenerId::next();
        let e2 = EntityId::next();

        assert_ne!(e1, e2);
        assert_ne!(e1.raw(), l1.raw());
        assert_ne!(e2.raw(), l1.raw());
    }

    #[test]
    fn display_names_the_kind() {
        let id = EntityId::next();
        assert_eq!(id.to_string(), format!("entity#{}", id.raw()));
    }
}
