//! Error types for the Arbor runtime.
//!
//! Only invariant violations and configuration problems are surfaced as
//! errors. Structural misuse, diff recursion limits and queue overflow are
//! logged and degraded gracefully; faults inside reaction functions unwind
//! as panics.

use crate::reactive::EntityId;

/// Errors produced by the Arbor runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A NaN or infinite number was written as attribute data.
    #[error("non-finite number written at `{path}`")]
    NonFiniteNumber { path: String },

    /// A reference to an already destroyed entity was written as attribute data.
    #[error("destroyed entity {entity} written at `{path}`")]
    DestroyedEntity { path: String, entity: EntityId },

    /// A runtime configuration value is out of range.
    #[error("invalid runtime config: {0}")]
    InvalidConfig(String),

    /// JSON input could not be parsed.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
