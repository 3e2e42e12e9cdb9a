//! Listener contexts.
//!
//! A listener context is whatever gets notified when a subscribed path
//! changes. Reactions are the common case, but an external consumer (a
//! view, a bridge to another framework) can implement [`Listener`] and
//! subscribe directly with [`Entity::on`](crate::store::Entity::on).

use std::rc::Rc;

use super::ListenerId;
use crate::store::Entity;

/// How a listener relates to the rest of the graph.
///
/// The sleep controller walks these links outward from an entity's
/// subscribers to decide whether anything ultimately consumes it.
pub enum Consumer {
    /// A terminal consumer. Its presence keeps upstream entities awake.
    View,
    /// The listener computes the value of this entity.
    Entity(Entity),
    /// The listener was created inside this enclosing context.
    Parent(Rc<dyn Listener>),
    /// Nothing further is reachable from this listener.
    Detached,
}

/// A context that can be registered on an entity path.
pub trait Listener {
    /// Stable identity used to key subscriptions.
    fn listener_id(&self) -> ListenerId;

    /// Called when a subscribed path changed.
    fn trigger(&self);

    /// Classification used by the sleep controller.
    fn consumer(&self) -> Consumer {
        Consumer::Detached
    }
}
