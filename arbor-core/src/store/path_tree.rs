//! Path Trees
//!
//! Every entity keeps a trie of its subscriptions. Each node is keyed by a
//! path segment and holds the listeners registered on exactly that path,
//! so a write at `a.b` only has to look at the `a.b` subtree and the
//! listeners on its ancestors.
//!
//! Nodes hold weak references: the tree indexes listeners, it does not
//! keep them alive.

use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::reactive::{Listener, ListenerId};

/// A node of an entity's subscription index.
#[derive(Default)]
pub struct PathTree {
    children: IndexMap<String, PathTree>,
    listeners: IndexMap<ListenerId, Weak<dyn Listener>>,
}

/// Listeners collected during one pass, deduplicated by id.
pub type ListenerSet = IndexMap<ListenerId, Rc<dyn Listener>>;

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on the path given by `segments`.
    pub fn insert(&mut self, segments: &[String], listener: &Rc<dyn Listener>) {
        let mut node = self;
        for segment in segments {
            node = node.children.entry(segment.clone()).or_default();
        }
        node.listeners
            .insert(listener.listener_id(), Rc::downgrade(listener));
    }

    /// Remove a listener from a path, pruning nodes left empty.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, segments: &[String], id: ListenerId) -> bool {
        match segments.split_first() {
            None => self.listeners.shift_remove(&id).is_some(),
            Some((head, rest)) => {
                let Some(child) = self.children.get_mut(head) else {
                    return false;
                };
                let removed = child.remove(rest, id);
                if child.is_empty() {
                    self.children.shift_remove(head);
                }
                removed
            }
        }
    }

    /// The node at `segments`, if anything is subscribed at or below it.
    pub fn node(&self, segments: &[String]) -> Option<&PathTree> {
        segments
            .iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    pub fn child(&self, segment: &str) -> Option<&PathTree> {
        self.children.get(segment)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &PathTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Live listeners registered on this exact node.
    pub fn self_listeners(&self) -> impl Iterator<Item = Rc<dyn Listener>> + '_ {
        self.listeners.values().filter_map(Weak::upgrade)
    }

    pub fn has_self_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn contains(&self, segments: &[String], id: ListenerId) -> bool {
        self.node(segments)
            .is_some_and(|node| node.listeners.contains_key(&id))
    }

    /// Add this node's listeners to `out`.
    pub fn collect_self(&self, out: &mut ListenerSet) {
        for listener in self.self_listeners() {
            out.entry(listener.listener_id()).or_insert(listener);
        }
    }

    /// Add every listener in this subtree to `out`.
    pub fn collect_all(&self, out: &mut ListenerSet) {
        self.collect_self(out);
        for child in self.children.values() {
            child.collect_all(out);
        }
    }

    /// Listeners on the strict ancestors of `segments`, root first.
    pub fn collect_ancestors(&self, segments: &[String], out: &mut ListenerSet) {
        let mut node = self;
        for segment in segments {
            node.collect_self(out);
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return,
            }
        }
    }

    /// Number of live (path, listener) registrations in this subtree.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
            + self
                .children
                .values()
                .map(PathTree::listener_count)
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.children.is_empty()
    }
}

impl std::fmt::Debug for PathTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTree")
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}
