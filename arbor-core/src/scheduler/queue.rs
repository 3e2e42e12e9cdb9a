//! Pending Reaction Queue
//!
//! An array-backed queue of reactions awaiting re-execution, deduplicated
//! by reaction identity.
//!
//! # Algorithm
//!
//! Pushes append and mark the queue unsorted. The first pop after a push
//! sorts the whole array by priority (ascending) and takes from the end.
//! Drains are small and pushes tend to arrive in bursts between pops, so a
//! lazy full sort beats maintaining a heap on every push.
//!
//! Ties are broken arbitrarily.

use std::collections::HashSet;

use tracing::trace;

use crate::reactive::{ListenerId, Reaction, WeakReaction};

struct Pending {
    priority: i32,
    id: ListenerId,
    reaction: WeakReaction,
}

/// Deduplicated, priority-ordered queue of reactions.
///
/// The queue holds weak handles: a reaction whose last handle is dropped
/// while it waits is skipped, not run one final time.
#[derive(Default)]
pub struct PriorityQueue {
    items: Vec<Pending>,
    queued: HashSet<ListenerId>,
    unsorted: bool,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reaction` unless it is already pending. Returns whether it
    /// was added.
    pub fn push(&mut self, reaction: &Reaction) -> bool {
        if !self.queued.insert(reaction.id()) {
            return false;
        }
        self.items.push(Pending {
            priority: reaction.priority(),
            id: reaction.id(),
            reaction: reaction.downgrade(),
        });
        self.unsorted = true;
        true
    }

    /// Remove the highest-priority live reaction. Once popped, a reaction
    /// may be queued again.
    pub fn pop(&mut self) -> Option<Reaction> {
        if self.unsorted {
            self.items.sort_by_key(|pending| pending.priority);
            self.unsorted = false;
        }
        while let Some(pending) = self.items.pop() {
            self.queued.remove(&pending.id);
            match pending.reaction.upgrade() {
                Some(reaction) => return Some(reaction),
                None => trace!(reaction = %pending.id, "dropped while queued"),
            }
        }
        None
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.queued.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{autorun_with, AutorunOptions};

    fn reaction(priority: i32) -> Reaction {
        autorun_with(AutorunOptions::new().priority(priority), || {})
    }

    #[test]
    fn pops_highest_priority_first() {
        let mut queue = PriorityQueue::new();
        let low = reaction(5);
        let high = reaction(10);
        let mid = reaction(7);

        queue.push(&low);
        queue.push(&high);
        queue.push(&mid);

        assert_eq!(queue.pop(), Some(high));
        assert_eq!(queue.pop(), Some(mid));
        assert_eq!(queue.pop(), Some(low));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn deduplicates_pending_reactions() {
        let mut queue = PriorityQueue::new();
        let r = reaction(1);

        assert!(queue.push(&r));
        assert!(!queue.push(&r));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(r.id()));
    }

    #[test]
    fn popped_reactions_can_be_requeued() {
        let mut queue = PriorityQueue::new();
        let r = reaction(1);

        queue.push(&r);
        queue.pop();
        assert!(!queue.contains(r.id()));
        assert!(queue.push(&r));
    }

    #[test]
    fn pushes_between_pops_are_resorted() {
        let mut queue = PriorityQueue::new();
        let first = reaction(1);
        let second = reaction(2);
        let urgent = reaction(100);

        queue.push(&first);
        queue.push(&second);
        assert_eq!(queue.pop(), Some(second));

        queue.push(&urgent);
        assert_eq!(queue.pop(), Some(urgent));
        assert_eq!(queue.pop(), Some(first));
        assert!(queue.is_empty());
    }

    #[test]
    fn dropped_reactions_are_skipped() {
        let mut queue = PriorityQueue::new();
        let kept = reaction(1);
        let dropped = reaction(10);

        queue.push(&kept);
        queue.push(&dropped);
        let dropped_id = dropped.id();
        drop(dropped);

        assert_eq!(queue.pop(), Some(kept));
        assert_eq!(queue.pop(), None);
        assert!(!queue.contains(dropped_id));
    }
}
