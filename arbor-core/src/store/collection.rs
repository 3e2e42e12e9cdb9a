//! Keyed Collections
//!
//! A collection is an entity that files its members under `#<id>`, where
//! the id is read from each member's id attribute (`"id"` by default). A
//! member without an id gets a temporary `#__unidentified<n>` key until it
//! has one. The collection also keeps a `size` count.
//!
//! Each member is watched by its own detached reaction, so a member whose
//! id changes is re-filed on the next drain and its old key is unset.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use super::entity::Entity;
use super::value::Value;
use crate::reactive::{autorun_with, untracked, AutorunOptions, Reaction};

const SIZE: &str = "size";

#[derive(Clone)]
pub struct Collection(Rc<CollectionInner>);

struct CollectionInner {
    entity: Entity,
    id_attribute: String,
    next_temp_id: Cell<u64>,
    members: RefCell<Vec<Member>>,
}

struct Member {
    child: Entity,
    key: Rc<RefCell<Option<String>>>,
    reaction: Reaction,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    /// A collection keyed by each member's `id`.
    pub fn new() -> Self {
        Self::with_id_attribute("id")
    }

    pub fn with_id_attribute(attribute: impl Into<String>) -> Self {
        Self(Rc::new(CollectionInner {
            entity: Entity::named("collection"),
            id_attribute: attribute.into(),
            next_temp_id: Cell::new(0),
            members: RefCell::new(Vec::new()),
        }))
    }

    /// The entity members are filed into.
    pub fn entity(&self) -> &Entity {
        &self.0.entity
    }

    /// Add `data` and return the member entity. An entity is added as is;
    /// anything else is wrapped in a new entity first.
    pub fn add(&self, data: impl Into<Value>) -> Entity {
        let child = match data.into() {
            Value::Entity(entity) => entity,
            other => Entity::with_value(other),
        };
        if self.position(&child).is_some() {
            return child;
        }

        self.0.entity.increment(SIZE, 1.0);
        let key = Rc::new(RefCell::new(None));
        let reaction = autorun_with(
            AutorunOptions::new().detached().named("collection:file"),
            file_member(Rc::downgrade(&self.0), child.clone(), key.clone()),
        );
        debug!(collection = %self.0.entity, member = %child, "added");

        self.0.members.borrow_mut().push(Member {
            child: child.clone(),
            key,
            reaction,
        });
        child
    }

    /// Remove the member filed under `#<id>`. Returns false when there is
    /// none.
    pub fn remove(&self, id: &str) -> bool {
        match untracked(|| self.0.entity.get_entity(&format!("#{id}"))) {
            Some(child) => self.remove_entity(&child),
            None => false,
        }
    }

    /// Remove `child`. Returns false when it is not a member.
    pub fn remove_entity(&self, child: &Entity) -> bool {
        let Some(index) = self.position(child) else {
            return false;
        };
        let member = self.0.members.borrow_mut().remove(index);
        member.reaction.destroy();

        self.0.entity.increment(SIZE, -1.0);
        if let Some(key) = member.key.borrow_mut().take() {
            self.0.unset_if_holding(&key, &member.child);
        }
        debug!(collection = %self.0.entity, member = %member.child, "removed");
        true
    }

    /// Tracked lookup of the member filed under `#<id>`.
    pub fn get(&self, id: &str) -> Option<Entity> {
        self.0.entity.get_entity(&format!("#{id}"))
    }

    /// Tracked member count.
    pub fn size(&self) -> usize {
        self.0.entity.get(SIZE).as_f64().unwrap_or_default() as usize
    }

    /// Members in insertion order. Not tracked.
    pub fn members(&self) -> Vec<Entity> {
        self.0
            .members
            .borrow()
            .iter()
            .map(|member| member.child.clone())
            .collect()
    }

    fn position(&self, child: &Entity) -> Option<usize> {
        self.0
            .members
            .borrow()
            .iter()
            .position(|member| member.child == *child)
    }
}

impl CollectionInner {
    fn temp_key(&self) -> String {
        let n = self.next_temp_id.get();
        self.next_temp_id.set(n + 1);
        format!("#__unidentified{n}")
    }

    fn unset_if_holding(&self, key: &str, child: &Entity) {
        let held = untracked(|| self.entity.get_entity(key));
        if held.as_ref() == Some(child) {
            self.entity.unset(key);
        }
    }
}

/// The reaction body that keeps `child` filed under its current id.
fn file_member(
    collection: Weak<CollectionInner>,
    child: Entity,
    key: Rc<RefCell<Option<String>>>,
) -> impl Fn() + 'static {
    move || {
        let Some(inner) = collection.upgrade() else {
            return;
        };
        let next = match child.get(&inner.id_attribute) {
            Value::Null => inner.temp_key(),
            id => format!("#{id}"),
        };

        untracked(|| {
            let previous = key.replace(Some(next.clone()));
            if previous.as_deref() == Some(next.as_str()) {
                return;
            }
            if let Some(previous) = previous {
                inner.unset_if_holding(&previous, &child);
            }
            inner.entity.set(&next, &child);
        });
    }
}
