//! The small set of caller-observable failures the core can report.
//!
//! Per spec.md §7, algorithmic failures to converge (GJK/EPA iteration
//! caps, degenerate manifold geometry) never reach this type — they are
//! absorbed silently (optionally logged via `tracing::warn!`) and treated
//! as "no contact this substep". `PhysicsError` only covers mistakes the
//! caller can actually recover from: an unknown/stale body handle, or a
//! world configuration that is invalid before a single body is simulated.

use thiserror::Error;

/// Errors returned by the public [`crate::world::World`] API.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsError {
    /// The given [`crate::world::BodyHandle`] does not refer to a body
    /// currently in the world: either it was never inserted, or it was
    /// removed and the slot may have been reused by a later insertion.
    #[error("unknown or stale body handle")]
    UnknownBody,

    /// [`crate::world::PhysicsConfig::cell_size`] was not strictly positive.
    #[error("spatial grid cell size must be positive, got {0}")]
    InvalidCellSize(f32),

    /// [`crate::world::PhysicsConfig::bucket_count`] was zero.
    #[error("spatial grid bucket count must be nonzero")]
    InvalidBucketCount,

    /// [`crate::world::PhysicsConfig::substeps`] was zero.
    #[error("substep count must be nonzero")]
    InvalidSubstepCount,
}

/// Convenience alias for results from the public API.
pub type PhysicsResult<T> = Result<T, PhysicsError>;
