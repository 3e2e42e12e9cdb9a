//! Query Engine
//!
//! `query` is the single read/write entry point of an entity. Everything
//! else (`get`, `set`, the mutation helpers) is a thin layer over it.
//!
//! # Reads
//!
//! A read walks the path through the value tree. When it meets a nested
//! entity it records a dependency on the path up to that entity and hands
//! the rest of the path to it, so the reader ends up subscribed to both
//! the reference and the data behind it. A read that runs into a missing
//! value still records the full requested path: creating the value later
//! must notify the reader. A read that returns a composite holding nested
//! entities also depends on each of those entities as a whole, since the
//! returned handles expose their data.
//!
//! # Writes
//!
//! A write first looks for a nested entity along the path and delegates
//! into it. Otherwise it creates any missing containers (each creation is
//! a write of its own, so it notifies), replaces the value along the path
//! copy-on-write, and diffs old against new. An index write that resizes
//! a sequence also notifies the readers of its `length`.

use std::collections::HashSet;

use tracing::warn;

use super::diff::DiffPass;
use super::path::{join, parse_index, Path};
use super::path_tree::ListenerSet;
use super::value::Value;
use super::Entity;
use crate::config;
use crate::error::Result;
use crate::reactive::{EntityId, ReactiveContext};

/// Flags recognized by [`Entity::query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// Return a nested entity itself instead of its data.
    pub dont_unwrap_entity: bool,
    /// Notify listeners regardless of the diff result.
    pub assume_changed: bool,
    /// Remove the value instead of assigning it.
    pub unset: bool,
}

impl QueryFlags {
    pub const NONE: Self = Self {
        dont_unwrap_entity: false,
        assume_changed: false,
        unset: false,
    };

    pub const DONT_UNWRAP: Self = Self {
        dont_unwrap_entity: true,
        ..Self::NONE
    };

    pub const ASSUME_CHANGED: Self = Self {
        assume_changed: true,
        ..Self::NONE
    };

    pub const UNSET: Self = Self {
        unset: true,
        ..Self::NONE
    };
}

/// Who is writing. Internal writes (bound recomputes, implicit container
/// creation, destroy) skip the bound-entity misuse check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOrigin {
    External,
    Internal,
}

impl Entity {
    /// Read or write `path`.
    ///
    /// With `value` (or the `unset` flag) this is a write and returns the
    /// written value; otherwise it is a tracked read.
    pub fn query(&self, path: &str, flags: QueryFlags, value: Option<Value>) -> Value {
        let path = Path::parse(path);
        if value.is_none() && !flags.unset {
            return self.read(path.segments(), flags.dont_unwrap_entity, true);
        }

        let value = if flags.unset { None } else { value };
        if let Some(value) = &value {
            check_invariants(value, &path);
        }
        self.write(path.segments(), value.clone(), flags, WriteOrigin::External);
        value.unwrap_or_default()
    }

    /// Tracked read of `path`. Nested entities are unwrapped.
    pub fn get(&self, path: &str) -> Value {
        self.query(path, QueryFlags::NONE, None)
    }

    /// Tracked read of the entity stored at `path`, if there is one.
    pub fn get_entity(&self, path: &str) -> Option<Entity> {
        self.query(path, QueryFlags::DONT_UNWRAP, None)
            .as_entity()
            .cloned()
    }

    /// Read `path` without recording a dependency.
    pub fn read_silent(&self, path: &str) -> Value {
        let path = Path::parse(path);
        self.read(path.segments(), false, false)
    }

    /// Write `value` at `path`.
    ///
    /// # Panics
    ///
    /// When validation is enabled, panics if `value` holds a non-finite
    /// number or a destroyed entity. Use [`Entity::try_set`] to get the
    /// error instead.
    pub fn set(&self, path: &str, value: impl Into<Value>) {
        self.query(path, QueryFlags::NONE, Some(value.into()));
    }

    /// Write `value` at `path`, rejecting invalid data.
    pub fn try_set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let path = Path::parse(path);
        let value = value.into();
        value.validate(&path.key())?;
        self.write(path.segments(), Some(value), QueryFlags::NONE, WriteOrigin::External);
        Ok(())
    }

    pub(crate) fn read(&self, segments: &[String], dont_unwrap: bool, track: bool) -> Value {
        let mut current = self.0.value.borrow().clone();

        for depth in 0..=segments.len() {
            if let Value::Entity(sub) = &current {
                let rest = &segments[depth..];
                if !(dont_unwrap && rest.is_empty()) {
                    if track {
                        ReactiveContext::track(self, &segments[..depth]);
                    }
                    let sub = sub.clone();
                    return sub.read(rest, dont_unwrap, track);
                }
            }
            let Some(segment) = segments.get(depth) else {
                break;
            };
            current = current.child(segment);
            if current.is_null() {
                break;
            }
        }

        if track {
            ReactiveContext::track(self, segments);
            if current.is_composite() && ReactiveContext::is_tracking() {
                track_nested(&current, &mut HashSet::new());
            }
        }
        current
    }

    pub(crate) fn write(
        &self,
        segments: &[String],
        value: Option<Value>,
        flags: QueryFlags,
        origin: WriteOrigin,
    ) {
        if let Some((sub, depth)) = self.delegate_target(segments, &value, flags) {
            sub.write(&segments[depth..], value, flags, origin);
            return;
        }

        if origin == WriteOrigin::External && self.is_bound() {
            warn!(
                entity = %self,
                path = %join(segments),
                "write into a bound entity; the next recompute overwrites it"
            );
        }

        for depth in 0..segments.len() {
            let prefix = &segments[..depth];
            let existing = self.0.value.borrow().lookup(prefix);
            if existing.is_composite() {
                continue;
            }
            if value.is_none() {
                return;
            }
            if !existing.is_null() {
                warn!(
                    entity = %self,
                    path = %join(prefix),
                    found = %existing,
                    "writing below a primitive; replacing it with a container"
                );
            }
            let container = Value::container_for(&segments[depth]);
            self.write(prefix, Some(container), QueryFlags::NONE, WriteOrigin::Internal);
        }

        let mut notify = ListenerSet::default();
        let prev = {
            let events = self.0.events.borrow();
            let mut ancestors = ListenerSet::default();
            events.collect_ancestors(segments, &mut ancestors);

            let (prev, curr, resized) = {
                let mut root = self.0.value.borrow_mut();
                let len_before = parent_seq_len(&root, segments);
                let prev = root.lookup(segments);
                root.set_path(segments, value);
                let len_after = parent_seq_len(&root, segments);
                (prev, root.lookup(segments), len_before != len_after)
            };

            let max_depth = config::with(|c| c.max_diff_depth);
            let mut changed = DiffPass::new(max_depth, &mut notify).run(
                events.node(segments),
                &prev,
                &curr,
                !ancestors.is_empty(),
                flags.assume_changed,
            );
            if resized {
                let length = segments
                    .split_last()
                    .and_then(|(_, parent)| events.node(parent))
                    .and_then(|parent| parent.child("length"));
                if let Some(length) = length {
                    length.collect_self(&mut notify);
                }
                changed = true;
            }
            if changed {
                for (id, listener) in ancestors {
                    notify.entry(id).or_insert(listener);
                }
            }
            prev
        };

        for listener in notify.into_values() {
            listener.trigger();
        }
        drop(prev);
    }

    /// The nested entity a write should be handed to, with the path depth
    /// at which it sits.
    fn delegate_target(
        &self,
        segments: &[String],
        value: &Option<Value>,
        flags: QueryFlags,
    ) -> Option<(Entity, usize)> {
        let root = self.0.value.borrow();
        let mut current = &*root;

        for depth in 0..=segments.len() {
            if let Value::Entity(sub) = current {
                let replaces_reference = depth == segments.len()
                    && (flags.dont_unwrap_entity
                        || value.is_none()
                        || matches!(value, Some(Value::Entity(_))));
                if replaces_reference {
                    return None;
                }
                return Some((sub.clone(), depth));
            }
            current = current.child_ref(segments.get(depth)?)?;
        }
        None
    }
}

/// Length of the sequence an index write lands in, if it is one.
fn parent_seq_len(root: &Value, segments: &[String]) -> Option<usize> {
    let (last, parent) = segments.split_last()?;
    parse_index(last)?;
    root.lookup(parent).as_seq().map(<[Value]>::len)
}

/// Record a whole-value read of every entity held inside `value`, and of
/// the entities held inside those. The caller sees their data through the
/// returned handles, so a change to it must re-run the caller.
fn track_nested(value: &Value, seen: &mut HashSet<EntityId>) {
    match value {
        Value::Entity(entity) => {
            if seen.insert(entity.id()) {
                ReactiveContext::track(entity, &[]);
                let inner = entity.0.value.borrow().clone();
                track_nested(&inner, seen);
            }
        }
        Value::Seq(items) => items.iter().for_each(|item| track_nested(item, seen)),
        Value::Map(map) => map.values().for_each(|item| track_nested(item, seen)),
        _ => {}
    }
}

fn check_invariants(value: &Value, path: &Path) {
    if !config::with(|c| c.validate) {
        return;
    }
    if let Err(err) = value.validate(&path.key()) {
        panic!("{err}");
    }
}
