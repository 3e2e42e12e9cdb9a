//! Structural Diffing
//!
//! After a write, the entity compares the old and new value at the written
//! path against the subscription subtree for that path and collects every
//! listener whose view of the data actually changed.
//!
//! # Algorithm
//!
//! The walk is driven by the path tree, not by the data:
//!
//! 1. Identical values (same scalar, same composite allocation, same entity)
//!    cannot have changed anywhere below, so the walk stops.
//! 2. A nested entity swapped in or out changes everything below it; all
//!    listeners in the subtree fire.
//! 3. Two different composites are not assumed to differ. The walk
//!    descends into the subscribed children first, and only falls back to
//!    comparing every key when a listener on this node (or the caller)
//!    needs an answer the subscribed children did not give.
//!
//! Setting a value to a deep-equal copy of itself therefore notifies
//! nobody, while removed keys and changed lengths are still caught.
//!
//! Recursion is capped by `max_diff_depth`. Past the cap the engine
//! assumes a change, which also bounds the walk on self-referencing data.

use tracing::warn;

use super::path_tree::{ListenerSet, PathTree};
use super::value::Value;

/// One diff pass. Listeners reached by a change are added to `notify`,
/// once each.
pub(crate) struct DiffPass<'a> {
    max_depth: usize,
    overflowed: bool,
    notify: &'a mut ListenerSet,
}

impl<'a> DiffPass<'a> {
    pub(crate) fn new(max_depth: usize, notify: &'a mut ListenerSet) -> Self {
        Self {
            max_depth,
            overflowed: false,
            notify,
        }
    }

    /// Diff `prev` against `curr` under `events`. Returns whether anything
    /// changed.
    ///
    /// `exhaustive` forces a full comparison when the subscribed paths
    /// show no change; `fire_all` treats the whole subtree as changed.
    pub(crate) fn run(
        &mut self,
        events: Option<&PathTree>,
        prev: &Value,
        curr: &Value,
        exhaustive: bool,
        fire_all: bool,
    ) -> bool {
        self.visit(events, prev, curr, exhaustive, 0, fire_all)
    }

    fn visit(
        &mut self,
        events: Option<&PathTree>,
        prev: &Value,
        curr: &Value,
        exhaustive: bool,
        depth: usize,
        fire_all: bool,
    ) -> bool {
        if depth > self.max_depth {
            if !self.overflowed {
                self.overflowed = true;
                warn!(
                    limit = self.max_depth,
                    "diff recursion limit reached; assuming change"
                );
            }
            return true;
        }

        let identical = prev.identical(curr);
        if identical && !fire_all {
            return false;
        }

        let mut changed = fire_all;
        let mut fire_all = fire_all;
        let mut exhaustive = exhaustive;
        if !identical {
            match (prev, curr) {
                (Value::Entity(_), _) | (_, Value::Entity(_)) => {
                    changed = true;
                    fire_all = true;
                }
                (Value::Seq(_), Value::Seq(_)) | (Value::Map(_), Value::Map(_)) => {
                    exhaustive = exhaustive || events.is_some_and(PathTree::has_self_listeners);
                }
                _ => changed = true,
            }
        }

        if let Some(events) = events {
            for (key, child) in events.children() {
                let prev_child = prev.child(key);
                let curr_child = curr.child(key);
                if self.visit(Some(child), &prev_child, &curr_child, false, depth + 1, fire_all) {
                    changed = true;
                }
            }
        }

        if exhaustive && !changed {
            changed = self.exhaustive(events, prev, curr, depth);
        }

        if changed {
            if let Some(events) = events {
                events.collect_self(self.notify);
            }
        }
        changed
    }

    /// Compare every key of two composites until a difference turns up.
    fn exhaustive(
        &mut self,
        events: Option<&PathTree>,
        prev: &Value,
        curr: &Value,
        depth: usize,
    ) -> bool {
        match (prev, curr) {
            (Value::Seq(prev), Value::Seq(curr)) => {
                if prev.len() != curr.len() {
                    return true;
                }
                for (index, (p, c)) in prev.iter().zip(curr.iter()).enumerate() {
                    let child = events.and_then(|e| e.child(&index.to_string()));
                    if self.visit(child, p, c, true, depth + 1, false) {
                        return true;
                    }
                }
                false
            }
            (Value::Map(prev), Value::Map(curr)) => {
                let missing = Value::Null;
                for (key, c) in curr.iter() {
                    let p = prev.get(key).unwrap_or(&missing);
                    let child = events.and_then(|e| e.child(key));
                    if self.visit(child, p, c, true, depth + 1, false) {
                        return true;
                    }
                }
                prev.keys().any(|key| !curr.contains_key(key))
            }
            _ => false,
        }
    }
}
