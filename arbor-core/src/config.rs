//! Runtime Configuration
//!
//! Tunables for validation, diffing and the scheduler. Configuration is
//! per thread, like the rest of the runtime state: install it once at
//! startup (or at the top of a test) with [`RuntimeConfig::install`].

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the scheduler reaches its next cooperative tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickMode {
    /// Drains only run when the host calls `drain()`.
    #[default]
    Manual,
    /// Drains run on a local tokio task.
    Tokio,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Reject invalid attribute data at write time.
    pub validate: bool,

    /// Reactions executed per drain pass before yielding to a later tick.
    pub max_drain_iterations: usize,

    /// Depth beyond which the diff engine assumes a change.
    pub max_diff_depth: usize,

    /// Executions slower than this are logged at debug level.
    pub slow_execution_ms: u64,

    /// Tick driver installed on the scheduler.
    pub tick: TickMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validate: cfg!(debug_assertions),
            max_drain_iterations: 5000,
            max_diff_depth: 16,
            slow_execution_ms: 10,
            tick: TickMode::Manual,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Check that every value is in range.
    pub fn check(&self) -> Result<()> {
        if self.max_drain_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_drain_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Install this configuration for the current thread.
    pub fn install(self) -> Result<()> {
        self.check()?;
        let tick = self.tick;
        CONFIG.with(|config| *config.borrow_mut() = self);
        crate::scheduler::Scheduler::set_tick_driver(tick.into());
        Ok(())
    }

    /// The configuration active on the current thread.
    pub fn current() -> Self {
        CONFIG.with(|config| config.borrow().clone())
    }
}

/// Read a single value out of the active configuration.
pub(crate) fn with<R>(f: impl FnOnce(&RuntimeConfig) -> R) -> R {
    CONFIG.with(|config| f(&config.borrow()))
}
