//! The XPBD contact constraint: zero-compliance position correction plus a
//! velocity pass for restitution.
//!
//! # Implementation
//!
//! This solver is deliberately simpler than the engine it's modeled on: no
//! warm starting, no soft constraints, no relaxation pass, no bias/TGS
//! split. A substep runs exactly one position solve and one velocity solve
//! per [`ContactConstraint`] — accuracy comes from increasing the substep
//! count, never from iterating the solver within a substep.
//!
//! # Steps
//!
//! Per [`crate::world::World::step`] substep:
//! 1. Build [`ContactConstraint`]s from the narrow phase's output.
//! 2. [`ContactConstraint::solve_position`] sequentially for every contact.
//! 3. [`crate::body::RigidBody::update`] in parallel, deriving velocities.
//! 4. [`ContactConstraint::solve_velocity`] sequentially for every contact,
//!    applying restitution against the presolve velocities captured at the
//!    end of integration.

use crate::body::RigidBody;
use crate::collision::manifold::ContactPoint;
use crate::math::*;
use arrayvec::ArrayVec;

const VELOCITY_ZERO_THRESHOLD: Scalar = 1e-5;

/// A contact between two bodies, live for exactly one substep.
pub struct ContactConstraint {
    pub body_a: u32,
    pub body_b: u32,
    pub normal: Vector,
    pub points: ArrayVec<ContactPoint, 4>,
    pub restitution: Scalar,
}

impl ContactConstraint {
    pub fn new(
        body_a: u32,
        body_b: u32,
        normal: Vector,
        points: ArrayVec<ContactPoint, 4>,
        restitution_a: Scalar,
        restitution_b: Scalar,
    ) -> Self {
        Self {
            body_a,
            body_b,
            normal,
            points,
            restitution: combined_restitution(restitution_a, restitution_b),
        }
    }

    /// Rigid (zero-compliance) position correction, per spec.md §4.8.
    pub fn solve_position(&self, a: &mut RigidBody, b: &mut RigidBody) {
        let n = self.normal;
        for point in &self.points {
            let r_a = point.position - a.transform.position;
            let r_b = point.position - b.transform.position;

            let w = effective_inverse_mass(a, b, r_a, r_b, n);
            if w <= 0.0 {
                continue;
            }

            let c = point.depth;
            if c <= 0.0 {
                continue;
            }
            let delta_lambda = c / w;

            apply_position_correction(a, -delta_lambda, n, r_a);
            apply_position_correction(b, delta_lambda, n, r_b);
        }
    }

    /// Restitution velocity pass, per spec.md §4.8.
    pub fn solve_velocity(&self, a: &mut RigidBody, b: &mut RigidBody) {
        let n = self.normal;
        for point in &self.points {
            let r_a = point.position - a.transform.position;
            let r_b = point.position - b.transform.position;

            let v_rel = (b.linear_velocity + b.angular_velocity.cross(r_b))
                - (a.linear_velocity + a.angular_velocity.cross(r_a));
            let vn = v_rel.dot(n);
            if vn >= 0.0 {
                continue;
            }

            let presolve_rel = (b.presolve_linear_velocity + b.presolve_angular_velocity.cross(r_b))
                - (a.presolve_linear_velocity + a.presolve_angular_velocity.cross(r_a));
            let vn_presolve = presolve_rel.dot(n);

            let w = effective_inverse_mass(a, b, r_a, r_b, n);
            if w <= 0.0 {
                continue;
            }

            let v_target = -self.restitution * vn_presolve;
            let delta_v = v_target - vn;
            let impulse = delta_v / w;

            apply_velocity_impulse(a, -impulse, n, r_a);
            apply_velocity_impulse(b, impulse, n, r_b);
        }

        clamp_jitter(a);
        clamp_jitter(b);
    }
}

fn effective_inverse_mass(a: &RigidBody, b: &RigidBody, r_a: Vector, r_b: Vector, n: Vector) -> Scalar {
    let angular_a = (r_a.cross(n)).dot(a.inverse_inertia_world() * r_a.cross(n));
    let angular_b = (r_b.cross(n)).dot(b.inverse_inertia_world() * r_b.cross(n));
    a.inverse_mass() + b.inverse_mass() + angular_a + angular_b
}

fn apply_position_correction(body: &mut RigidBody, signed_lambda: Scalar, n: Vector, r: Vector) {
    if body.is_static() {
        return;
    }
    let inv_mass = body.inverse_mass();
    body.transform.position += inv_mass * signed_lambda * n;

    let inv_inertia = body.inverse_inertia_world();
    let axis = inv_inertia * (r.cross(n)) * signed_lambda;
    apply_small_rotation(body, axis);
    body.recompute_aabb();
    body.wake();
}

fn apply_velocity_impulse(body: &mut RigidBody, signed_impulse: Scalar, n: Vector, r: Vector) {
    if body.is_static() {
        return;
    }
    let inv_mass = body.inverse_mass();
    body.linear_velocity += inv_mass * signed_impulse * n;

    let inv_inertia = body.inverse_inertia_world();
    body.angular_velocity += inv_inertia * (r.cross(n)) * signed_impulse;
}

/// Rotates `body`'s orientation by the small-angle quaternion whose axis is
/// `axis` (already scaled by the correction magnitude), per spec.md §4.8.
fn apply_small_rotation(body: &mut RigidBody, axis: Vector) {
    let current = body.transform.rotation();
    let delta = Rotation::from_xyzw(axis.x, axis.y, axis.z, 0.0) * current;
    let updated = Rotation::from_xyzw(
        current.x + 0.5 * delta.x,
        current.y + 0.5 * delta.y,
        current.z + 0.5 * delta.z,
        current.w + 0.5 * delta.w,
    )
    .normalize();
    body.transform.set_rotation(updated);
}

fn clamp_jitter(body: &mut RigidBody) {
    if body.linear_velocity.length_squared() < VELOCITY_ZERO_THRESHOLD * VELOCITY_ZERO_THRESHOLD {
        body.linear_velocity = Vector::ZERO;
    }
    if body.angular_velocity.length_squared() < VELOCITY_ZERO_THRESHOLD * VELOCITY_ZERO_THRESHOLD {
        body.angular_velocity = Vector::ZERO;
    }
}

/// Arithmetic mean of the two bodies' restitution coefficients (spec.md §9
/// Open Question: this spec commits to the mean over max/geometric-mean).
pub fn combined_restitution(a: Scalar, b: Scalar) -> Scalar {
    (a + b) * 0.5
}
