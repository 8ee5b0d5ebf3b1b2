//! Math primitive aliases.
//!
//! The simulation core treats 3-vectors, quaternions, and 3x3 matrices as
//! external collaborators and leans on [`glam`] for them rather than
//! hand-rolling linear algebra. Importing `rigid_xpbd::math::*` brings the
//! whole facade into scope, mirroring how callers of the engine this crate
//! is modeled on write `use avian3d::{math::*, prelude::*};`.

/// The scalar type used throughout the simulation.
pub type Scalar = f32;

/// A 3D vector: positions, velocities, forces, torques, normals.
pub type Vector = glam::Vec3;

/// A unit quaternion used for rigid body orientation.
pub type Rotation = glam::Quat;

/// A 3x3 matrix, used for inertia tensors.
pub type Matrix3 = glam::Mat3;

/// `Scalar::EPSILON`, re-exported for call sites that only import `math::*`.
pub const EPSILON: Scalar = Scalar::EPSILON;

/// Squared length below which a vector is treated as the zero vector.
pub const DEGENERATE_LENGTH_SQ: Scalar = 1e-16;
