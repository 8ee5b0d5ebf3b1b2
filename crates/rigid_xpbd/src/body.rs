//! Rigid body state and the per-substep integrator.
//!
//! # Implementation
//!
//! A [`RigidBody`] owns its [`Shape`] exclusively and is otherwise plain
//! data: the [`crate::world::World`] holds bodies in a `Vec` and mutates
//! them in place rather than reaching through shared ownership. Static
//! bodies and sleeping bodies are both excluded from [`RigidBody::integrate`]
//! and [`RigidBody::update`], but only static bodies are permanently
//! excluded from the solver's effective-mass terms (sleeping bodies can be
//! woken by a contact and rejoin the next substep).

use crate::math::*;
use crate::shape::{Aabb, Shape};

/// Whether a body is simulated or immovable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Dynamic,
    Static,
}

impl BodyType {
    pub fn is_dynamic(self) -> bool {
        matches!(self, BodyType::Dynamic)
    }

    pub fn is_static(self) -> bool {
        matches!(self, BodyType::Static)
    }
}

/// Position and orientation, with a cached inverse rotation kept in sync
/// whenever the rotation changes (spec.md §3 Transform invariant).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector,
    rotation: Rotation,
    inverse_rotation: Rotation,
}

impl Transform {
    pub fn new(position: Vector, rotation: Rotation) -> Self {
        let rotation = rotation.normalize();
        Self {
            position,
            rotation,
            inverse_rotation: rotation.inverse(),
        }
    }

    pub fn identity() -> Self {
        Self::new(Vector::ZERO, Rotation::IDENTITY)
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn inverse_rotation(&self) -> Rotation {
        self.inverse_rotation
    }

    /// Replaces the rotation, refreshing the cached inverse.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation.normalize();
        self.inverse_rotation = self.rotation.inverse();
    }
}

/// Per-body physical properties. `friction` exists in the data model but is
/// not read anywhere in this core (friction is an explicit Non-goal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub density: Scalar,
    pub restitution: Scalar,
    pub linear_damping: Scalar,
    pub angular_damping: Scalar,
    pub friction: Scalar,
}

impl Material {
    pub fn new(density: Scalar, restitution: Scalar) -> Self {
        Self {
            density,
            restitution: restitution.clamp(0.0, 1.0),
            linear_damping: 0.0,
            angular_damping: 0.0,
            friction: 0.0,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

/// Awake/asleep state, with the timer that drives the Awake -> Sleeping
/// transition (spec.md §4.2 state machine).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepState {
    pub is_sleeping: bool,
    pub timer: Scalar,
}

impl Default for SleepState {
    fn default() -> Self {
        Self {
            is_sleeping: false,
            timer: 0.0,
        }
    }
}

/// A simulated convex body.
pub struct RigidBody {
    pub previous_transform: Transform,
    pub transform: Transform,

    pub previous_linear_velocity: Vector,
    pub linear_velocity: Vector,
    pub previous_angular_velocity: Vector,
    pub angular_velocity: Vector,

    /// Linear/angular velocity immediately after integration, before any
    /// contact solving. `solve_velocity` reads these to compute the
    /// restitution target (spec.md §4.8).
    pub presolve_linear_velocity: Vector,
    pub presolve_angular_velocity: Vector,

    inertia_local: Matrix3,
    inverse_inertia_local: Matrix3,
    mass: Scalar,
    inverse_mass: Scalar,

    accumulated_force: Vector,
    accumulated_torque: Vector,

    pub material: Material,
    pub body_type: BodyType,
    pub shape: Shape,
    pub user_data: u64,
    pub is_trigger: bool,
    pub sleep: SleepState,

    aabb: Aabb,
}

impl RigidBody {
    pub fn new(
        transform: Transform,
        shape: Shape,
        body_type: BodyType,
        material: Material,
        user_data: u64,
    ) -> Self {
        let is_static = body_type.is_static() || shape.is_plane();
        let mass = if is_static {
            Scalar::INFINITY
        } else {
            shape.compute_mass(material.density)
        };
        let inverse_mass = if mass.is_finite() && mass > 0.0 {
            1.0 / mass
        } else {
            0.0
        };
        let inertia_local = if is_static {
            Matrix3::ZERO
        } else {
            shape.compute_local_inertia(mass)
        };
        let inverse_inertia_local = if is_static {
            Matrix3::ZERO
        } else {
            inertia_local.inverse()
        };
        let aabb = shape.compute_aabb(transform.position, transform.rotation());

        Self {
            previous_transform: transform,
            transform,
            previous_linear_velocity: Vector::ZERO,
            linear_velocity: Vector::ZERO,
            previous_angular_velocity: Vector::ZERO,
            angular_velocity: Vector::ZERO,
            presolve_linear_velocity: Vector::ZERO,
            presolve_angular_velocity: Vector::ZERO,
            inertia_local,
            inverse_inertia_local,
            mass,
            inverse_mass,
            accumulated_force: Vector::ZERO,
            accumulated_torque: Vector::ZERO,
            material,
            body_type: if is_static {
                BodyType::Static
            } else {
                body_type
            },
            shape,
            user_data,
            is_trigger: false,
            sleep: SleepState::default(),
            aabb,
        }
    }

    pub fn is_static(&self) -> bool {
        self.body_type.is_static()
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep.is_sleeping
    }

    pub fn mass(&self) -> Scalar {
        self.mass
    }

    pub fn inverse_mass(&self) -> Scalar {
        self.inverse_mass
    }

    pub fn inertia_local(&self) -> Matrix3 {
        self.inertia_local
    }

    pub fn inverse_inertia_local(&self) -> Matrix3 {
        self.inverse_inertia_local
    }

    /// World-space inverse inertia tensor `R * I^-1_local * R^T`, zero for
    /// static bodies.
    pub fn inverse_inertia_world(&self) -> Matrix3 {
        if self.is_static() {
            return Matrix3::ZERO;
        }
        let r = Matrix3::from_quat(self.transform.rotation());
        r * self.inverse_inertia_local * r.transpose()
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn recompute_aabb(&mut self) {
        self.aabb = self
            .shape
            .compute_aabb(self.transform.position, self.transform.rotation());
    }

    /// Accumulates an external force for the next [`RigidBody::integrate`]
    /// and wakes the body (spec.md §4.9 Awakening).
    pub fn apply_force(&mut self, force: Vector) {
        if self.is_static() {
            return;
        }
        self.accumulated_force += force;
        self.wake();
    }

    /// Accumulates an external torque for the next [`RigidBody::integrate`]
    /// and wakes the body.
    pub fn apply_torque(&mut self, torque: Vector) {
        if self.is_static() {
            return;
        }
        self.accumulated_torque += torque;
        self.wake();
    }

    pub fn wake(&mut self) {
        self.sleep.is_sleeping = false;
        self.sleep.timer = 0.0;
    }

    /// Advances a dynamic, awake body by `h` seconds under `gravity`,
    /// per spec.md §4.2. Static and sleeping bodies are left untouched.
    pub fn integrate(&mut self, h: Scalar, gravity: Vector) {
        if self.is_static() || self.is_sleeping() {
            return;
        }

        self.previous_transform = self.transform;

        // Linear: gravity + accumulated force, then exponential damping.
        self.linear_velocity += h * gravity + h * self.inverse_mass * self.accumulated_force;
        self.linear_velocity *= (-self.material.linear_damping * h).exp();
        let mut position = self.transform.position;
        position += h * self.linear_velocity;

        // Angular: torque is accumulated pre-scaled by the reciprocal of
        // the substep it will be consumed in (see DESIGN.md "Torque
        // accumulation units"), so integrate scales by `h` to match how
        // linear force is scaled by `h / m` above.
        let inv_inertia_world = self.inverse_inertia_world();
        self.angular_velocity += h * (inv_inertia_world * self.accumulated_torque);
        self.angular_velocity *= (-self.material.angular_damping * h).exp();

        let omega_quat = Rotation::from_xyzw(
            self.angular_velocity.x,
            self.angular_velocity.y,
            self.angular_velocity.z,
            0.0,
        );
        let current_rotation = self.transform.rotation();
        let delta = omega_quat * current_rotation;
        let updated = Rotation::from_xyzw(
            current_rotation.x + 0.5 * h * delta.x,
            current_rotation.y + 0.5 * h * delta.y,
            current_rotation.z + 0.5 * h * delta.z,
            current_rotation.w + 0.5 * h * delta.w,
        )
        .normalize();

        self.transform.position = position;
        self.transform.set_rotation(updated);

        self.presolve_linear_velocity = self.linear_velocity;
        self.presolve_angular_velocity = self.angular_velocity;

        self.recompute_aabb();
        self.accumulated_force = Vector::ZERO;
        self.accumulated_torque = Vector::ZERO;
    }

    /// Derives velocities from the position delta left behind by the
    /// position solver, per spec.md §4.2 `update(h)`.
    pub fn update(&mut self, h: Scalar) {
        if self.is_static() || self.is_sleeping() {
            return;
        }
        self.previous_linear_velocity = self.linear_velocity;
        self.previous_angular_velocity = self.angular_velocity;

        self.linear_velocity =
            (self.transform.position - self.previous_transform.position) / h;

        let delta_rotation = self.transform.rotation() * self.previous_transform.rotation().inverse();
        let (mut x, mut y, mut z, mut w) = (
            delta_rotation.x,
            delta_rotation.y,
            delta_rotation.z,
            delta_rotation.w,
        );
        if w < 0.0 {
            x = -x;
            y = -y;
            z = -z;
            w = -w;
        }
        let _ = w;
        self.angular_velocity = Vector::new(x, y, z) * (2.0 / h);
    }

    /// Support point in world space for a world-space direction `d`, per
    /// spec.md §4.2 `support_world`.
    pub fn support_world(&self, d: Vector) -> Vector {
        let local_d = self.transform.inverse_rotation() * d;
        let local_support = self.shape.support(local_d);
        self.transform.rotation() * local_support + self.transform.position
    }

    /// World-space contact feature for a world-space direction `d`.
    pub fn contact_feature_world(&self, d: Vector) -> crate::shape::ContactFeature {
        let local_d = self.transform.inverse_rotation() * d;
        self.shape
            .contact_feature(local_d)
            .into_iter()
            .map(|v| self.transform.rotation() * v + self.transform.position)
            .collect()
    }

    /// Awake -> Sleeping transition, per spec.md §4.2 `try_sleep`.
    pub fn try_sleep(&mut self, h: Scalar, time_threshold: Scalar, vel_threshold: Scalar) {
        if self.is_static() {
            return;
        }
        let below_threshold = self.linear_velocity.length() < vel_threshold
            && self.angular_velocity.length() < vel_threshold;

        if below_threshold {
            self.sleep.timer += h;
            if self.sleep.timer >= time_threshold {
                self.linear_velocity = Vector::ZERO;
                self.angular_velocity = Vector::ZERO;
                self.sleep.is_sleeping = true;
            }
        } else {
            self.sleep.timer = 0.0;
            self.sleep.is_sleeping = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use approx::assert_relative_eq;

    fn dynamic_sphere() -> RigidBody {
        RigidBody::new(
            Transform::identity(),
            Shape::sphere(1.0),
            BodyType::Dynamic,
            Material::new(1.0, 0.5),
            0,
        )
    }

    #[test]
    fn inertia_inverse_round_trips() {
        let b = dynamic_sphere();
        let i = b.inertia_local();
        let inv = b.inverse_inertia_local();
        let identity = i * inv;
        assert_relative_eq!(identity.x_axis.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(identity.y_axis.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(identity.z_axis.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn static_body_never_moves() {
        let mut b = RigidBody::new(
            Transform::identity(),
            Shape::cuboid(1.0, 1.0, 1.0),
            BodyType::Static,
            Material::default(),
            0,
        );
        let before = b.transform;
        b.integrate(1.0 / 60.0, Vector::new(0.0, -9.81, 0.0));
        assert_eq!(before, b.transform);
    }

    #[test]
    fn zero_velocity_body_does_not_move_without_gravity() {
        let mut b = dynamic_sphere();
        b.integrate(1.0 / 60.0, Vector::ZERO);
        assert_relative_eq!(b.transform.position, Vector::ZERO);
    }

    #[test]
    fn gravity_integrates_into_downward_motion() {
        let mut b = dynamic_sphere();
        b.integrate(1.0 / 60.0, Vector::new(0.0, -9.81, 0.0));
        assert!(b.transform.position.y < 0.0);
    }

    #[test]
    fn rotation_stays_unit_after_many_substeps() {
        let mut b = dynamic_sphere();
        b.angular_velocity = Vector::new(10.0, 20.0, 5.0);
        for _ in 0..2000 {
            b.integrate(0.001, Vector::ZERO);
        }
        assert_relative_eq!(b.transform.rotation().length(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn sleep_after_sustained_low_velocity() {
        let mut b = dynamic_sphere();
        b.linear_velocity = Vector::new(0.001, 0.0, 0.0);
        for _ in 0..20 {
            b.try_sleep(0.01, 0.1, 0.01);
        }
        assert!(b.is_sleeping());
    }

    #[test]
    fn apply_force_wakes_body() {
        let mut b = dynamic_sphere();
        b.sleep.is_sleeping = true;
        b.apply_force(Vector::new(1.0, 0.0, 0.0));
        assert!(!b.is_sleeping());
    }
}
