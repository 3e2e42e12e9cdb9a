//! Reaction Scheduler
//!
//! Triggered reactions are not run on the spot. They are queued, and a
//! drain later executes them in priority order. This coalesces bursts of
//! writes: a reaction triggered ten times before the drain runs once.
//!
//! # Drains
//!
//! A drain pops and executes reactions until the queue is empty. Reactions
//! queued while a drain is running join that same drain, so a single write
//! settles completely within one `drain()` call. A cap on executions per
//! drain guards against runaway fan-out; hitting it defers the rest to a
//! later tick.
//!
//! # Ticks
//!
//! Queueing into an idle scheduler requests a tick from the installed
//! [`TickDriver`]. The default driver is manual: the host (or a test)
//! calls [`drain`] when it wants the queue processed.
//!
//! # Freezing
//!
//! A frozen scheduler still queues reactions but requests no ticks and
//! does not drain, not even on an explicit [`drain`], so tests can inspect
//! pending work. [`unfreeze`] lets the next drain through.

mod queue;
mod tick;

use std::cell::RefCell;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config;
use crate::reactive::Reaction;

pub use queue::PriorityQueue;
pub use tick::TickDriver;

#[derive(Default)]
struct SchedulerState {
    queue: PriorityQueue,
    drain_scheduled: bool,
    draining: bool,
    frozen: bool,
    driver: TickDriver,
}

impl SchedulerState {
    /// Mark a drain as scheduled if one is needed, returning the driver
    /// to notify. The caller invokes it after releasing the state.
    fn request_tick(&mut self) -> Option<TickDriver> {
        if self.drain_scheduled || self.draining || self.frozen || self.queue.is_empty() {
            return None;
        }
        self.drain_scheduled = true;
        Some(self.driver.clone())
    }
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// The per-thread reaction scheduler.
pub struct Scheduler;

impl Scheduler {
    /// Queue `reaction` for the next drain. A reaction already pending is
    /// not queued twice.
    pub fn enqueue(reaction: &Reaction) {
        let tick = with_state(|state| {
            if state.queue.push(reaction) {
                state.request_tick()
            } else {
                None
            }
        });
        if let Some(driver) = tick {
            driver.schedule();
        }
    }

    /// Execute pending reactions in priority order until the queue is
    /// empty or the per-drain cap is reached.
    ///
    /// Calling `drain` from inside a running drain, or while frozen, does
    /// nothing. A panic in a reaction propagates out of `drain`; the
    /// remaining work is left queued for the next tick.
    pub fn drain() {
        let blocked = with_state(|state| {
            if state.draining || state.frozen {
                return true;
            }
            state.draining = true;
            state.drain_scheduled = false;
            false
        });
        if blocked {
            return;
        }

        let _guard = DrainGuard;
        let started = Instant::now();
        let cap = config::with(|c| c.max_drain_iterations);
        let mut executed = 0usize;

        while let Some(reaction) = with_state(|state| state.queue.pop()) {
            reaction.execute();
            executed += 1;

            let pending = Self::pending();
            if executed >= cap && pending > 0 {
                warn!(
                    cap,
                    pending,
                    "drain iteration cap reached; continuing on a later tick"
                );
                break;
            }
        }

        debug!(
            executed,
            elapsed_us = started.elapsed().as_micros() as u64,
            "drain finished"
        );
    }

    /// Stop requesting ticks and hold every drain until [`unfreeze`].
    pub fn freeze() {
        with_state(|state| state.frozen = true);
    }

    /// Resume normal scheduling, requesting a tick for pending work.
    pub fn unfreeze() {
        let tick = with_state(|state| {
            state.frozen = false;
            state.request_tick()
        });
        if let Some(driver) = tick {
            driver.schedule();
        }
    }

    pub fn is_frozen() -> bool {
        with_state(|state| state.frozen)
    }

    /// Number of reactions waiting for a drain.
    pub fn pending() -> usize {
        with_state(|state| state.queue.len())
    }

    pub fn is_queued(reaction: &Reaction) -> bool {
        with_state(|state| state.queue.contains(reaction.id()))
    }

    /// No pending reactions, no scheduled drain and no drain in progress.
    pub fn is_idle() -> bool {
        with_state(|state| state.queue.is_empty() && !state.drain_scheduled && !state.draining)
    }

    /// Replace the tick driver. Pending work is rescheduled on the new one.
    pub fn set_tick_driver(driver: TickDriver) {
        let tick = with_state(|state| {
            state.driver = driver;
            state.drain_scheduled = false;
            state.request_tick()
        });
        if let Some(driver) = tick {
            driver.schedule();
        }
    }
}

/// Entry point for tick drivers: drain if a drain is still scheduled.
pub fn run_scheduled() {
    let due = with_state(|state| state.drain_scheduled);
    if due {
        Scheduler::drain();
    }
}

/// Clears the draining flag and reschedules leftover work, on both normal
/// exit and unwind.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let tick = with_state(|state| {
            state.draining = false;
            state.request_tick()
        });
        if let Some(driver) = tick {
            driver.schedule();
        }
    }
}

/// Run every pending reaction now. See [`Scheduler::drain`].
pub fn drain() {
    Scheduler::drain();
}

/// See [`Scheduler::freeze`].
pub fn freeze() {
    Scheduler::freeze();
}

/// See [`Scheduler::unfreeze`].
pub fn unfreeze() {
    Scheduler::unfreeze();
}

/// See [`Scheduler::is_idle`].
pub fn is_idle() -> bool {
    Scheduler::is_idle()
}
