//! Analytic plane collider: bypasses GJK/EPA when one body of a candidate
//! pair is a [`crate::shape::Shape::Plane`].
//!
//! # Implementation
//!
//! Grounded directly on spec.md §4.7 — there is no narrow-phase iteration
//! here, just a closed-form penetration test per shape kind.

use crate::body::RigidBody;
use crate::collision::manifold::{ContactPoint, Manifold};
use crate::math::*;
use crate::shape::{Plane, Shape};

/// Computes the plane-object contact, or `None` if not penetrating.
/// `plane` and `object` are world-space; `plane_is_a` tells the caller
/// which way to orient the returned normal (A toward B).
pub fn plane_contact(plane_body: &RigidBody, object: &RigidBody) -> Option<(Vector, Manifold)> {
    let plane = match &plane_body.shape {
        Shape::Plane(p) => *p,
        _ => unreachable!("plane_contact called with a non-plane body"),
    };

    let manifold = match &object.shape {
        Shape::Sphere(s) => sphere_against_plane(object, s.radius, &plane),
        Shape::Cuboid(_) => cuboid_against_plane(object, &plane),
        Shape::Plane(_) => return None, // plane-plane pairs are never emitted by the broad phase
    };

    if manifold.is_empty() {
        None
    } else {
        Some((plane.normal, manifold))
    }
}

fn sphere_against_plane(object: &RigidBody, radius: Scalar, plane: &Plane) -> Manifold {
    let center = object.transform.position;
    let signed = center.dot(plane.normal) - plane.distance;
    let depth = radius - signed;
    let mut m = Manifold::new();
    if depth > 0.0 {
        let position = center - plane.normal * radius;
        m.push(ContactPoint { position, depth });
    }
    m
}

fn cuboid_against_plane(object: &RigidBody, plane: &Plane) -> Manifold {
    let half_extents = match &object.shape {
        Shape::Cuboid(c) => c.half_extents,
        _ => unreachable!(),
    };

    let mut candidates: arrayvec::ArrayVec<ContactPoint, 8> = arrayvec::ArrayVec::new();
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                let local = Vector::new(
                    sx * half_extents.x,
                    sy * half_extents.y,
                    sz * half_extents.z,
                );
                let world = object.transform.rotation() * local + object.transform.position;
                let signed = world.dot(plane.normal) - plane.distance;
                if signed < 0.0 {
                    let _ = candidates.try_push(ContactPoint {
                        position: world,
                        depth: -signed,
                    });
                }
            }
        }
    }

    candidates.sort_unstable_by(|a, b| b.depth.partial_cmp(&a.depth).unwrap());
    candidates.into_iter().take(4).collect()
}
