//! Tick Drivers
//!
//! When work is queued and no drain is pending, the scheduler asks its
//! tick driver to arrange a drain "soon": after the current synchronous
//! call stack unwinds, never inside it.

use std::fmt;
use std::rc::Rc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

use crate::config::TickMode;

/// Strategy for reaching the next cooperative tick.
#[derive(Clone, Default)]
pub enum TickDriver {
    /// Only mark the drain as scheduled; the host calls `drain()` itself.
    #[default]
    Manual,
    /// Drain on a tokio task. Runtime state is per thread, so the task
    /// must run on the writing thread: this needs a current-thread runtime
    /// (a `LocalSet` inside one works too). Elsewhere it logs a warning
    /// and leaves the drain to the host.
    Tokio,
    /// Let the host decide. The callback should arrange a call to
    /// [`run_scheduled`](super::run_scheduled) later, not drain inline.
    Custom(Rc<dyn Fn()>),
}

impl TickDriver {
    pub fn custom(callback: impl Fn() + 'static) -> Self {
        TickDriver::Custom(Rc::new(callback))
    }

    pub(crate) fn schedule(&self) {
        match self {
            TickDriver::Manual => {}
            TickDriver::Tokio => {
                let Ok(handle) = Handle::try_current() else {
                    warn!("tokio tick driver used outside a runtime; waiting for a manual drain");
                    return;
                };
                if handle.runtime_flavor() != RuntimeFlavor::CurrentThread {
                    warn!(
                        flavor = ?handle.runtime_flavor(),
                        "tokio tick driver needs a current-thread runtime; waiting for a manual drain"
                    );
                    return;
                }
                handle.spawn(async {
                    tokio::task::yield_now().await;
                    super::run_scheduled();
                });
            }
            TickDriver::Custom(callback) => callback(),
        }
    }
}

impl From<TickMode> for TickDriver {
    fn from(mode: TickMode) -> Self {
        match mode {
            TickMode::Manual => TickDriver::Manual,
            TickMode::Tokio => TickDriver::Tokio,
        }
    }
}

impl fmt::Debug for TickDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickDriver::Manual => f.write_str("Manual"),
            TickDriver::Tokio => f.write_str("Tokio"),
            TickDriver::Custom(_) => f.write_str("Custom"),
        }
    }
}
