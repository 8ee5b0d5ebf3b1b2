//! Substepped XPBD rigid-body simulation core.
//!
//! # Implementation
//!
//! The collision pipeline (broad phase, GJK, EPA, manifold construction,
//! and the analytic plane fast path) lives under [`collision`]; the
//! contact solver lives under [`dynamics`]; [`world::World`] is the single
//! public entry point that orchestrates both plus the event system over a
//! substepped fixed-timestep loop.
//!
//! Typical usage:
//!
//! ```no_run
//! use rigid_xpbd::prelude::*;
//!
//! let mut world = World::new(PhysicsConfig::default()).unwrap();
//! let ground = world.insert_body(BodyDesc::new(
//!     Transform::identity(),
//!     Shape::plane(Vector::Y, 0.0),
//!     BodyType::Static,
//!     Material::new(1.0, 0.3),
//! ));
//! let ball = world.insert_body(BodyDesc::new(
//!     Transform::new(Vector::new(0.0, 5.0, 0.0), Rotation::IDENTITY),
//!     Shape::sphere(0.5),
//!     BodyType::Dynamic,
//!     Material::new(700.0, 0.3),
//! ));
//! let _ = ground;
//! let _ = ball;
//!
//! world.step(1.0 / 60.0).unwrap();
//! ```

pub mod body;
pub mod collision;
pub mod dynamics;
pub mod error;
pub mod events;
pub mod math;
pub mod shape;
pub mod world;

/// Common imports for users of this crate, mirroring the facade pattern
/// (`use avian3d::{math::*, prelude::*};`) the engine this crate is
/// modeled on exposes.
pub mod prelude {
    pub use crate::body::{BodyType, Material, RigidBody, Transform};
    pub use crate::error::{PhysicsError, PhysicsResult};
    pub use crate::events::{Event, EventKind};
    pub use crate::math::*;
    pub use crate::shape::Shape;
    pub use crate::world::{BodyDesc, BodyHandle, PhysicsConfig, World};
}
