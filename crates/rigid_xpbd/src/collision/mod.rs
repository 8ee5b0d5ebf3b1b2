//! The collision pipeline: broad phase, GJK, EPA, manifold construction,
//! and the analytic plane fast path.

pub mod broad_phase;
pub mod epa;
pub mod gjk;
pub mod manifold;
pub mod plane;

use crate::body::RigidBody;
use crate::math::Vector;
use manifold::Manifold;
use tracing::warn;

/// Unified narrow-phase result for a single candidate pair: either body may
/// run through GJK+EPA, or the plane-analytic fast path, but both produce
/// the same shape of output.
pub struct NarrowPhaseContact {
    pub a: u32,
    pub b: u32,
    pub normal: Vector,
    pub manifold: Manifold,
}

/// Runs the narrow phase for one candidate pair, dispatching to the
/// plane-analytic path when either body is a plane and to GJK+EPA+manifold
/// otherwise. Returns `None` when the bodies are not actually in contact.
pub fn narrow_phase_pair(
    index_a: u32,
    index_b: u32,
    body_a: &RigidBody,
    body_b: &RigidBody,
) -> Option<NarrowPhaseContact> {
    // The broad phase's plane bucket pairs every body with every plane
    // unconditionally (spec.md §4.3), so the static-static filter the cell
    // path applies has to be re-applied here too (spec.md §8: no pair of
    // static bodies ever produces a contact constraint).
    if body_a.is_static() && body_b.is_static() {
        return None;
    }

    if body_a.shape.is_plane() || body_b.shape.is_plane() {
        let (plane_idx, plane_body, object_idx, object_body) = if body_a.shape.is_plane() {
            (index_a, body_a, index_b, body_b)
        } else {
            (index_b, body_b, index_a, body_a)
        };
        let (plane_normal, manifold) = plane::plane_contact(plane_body, object_body)?;
        // The contact normal must point from A toward B by convention.
        let normal = if plane_idx == index_a {
            plane_normal
        } else {
            -plane_normal
        };
        let _ = object_idx;
        return Some(NarrowPhaseContact {
            a: index_a,
            b: index_b,
            normal,
            manifold,
        });
    }

    let (overlap, simplex) = gjk::gjk_overlap(body_a, body_b);
    if !overlap {
        return None;
    }
    let Some((normal, depth)) = epa::epa_penetration(body_a, body_b, &simplex) else {
        warn!(a = index_a, b = index_b, "EPA did not converge on a GJK-reported overlap; dropping contact for this substep");
        return None;
    };
    let manifold = manifold::build_manifold(body_a, body_b, normal, depth);
    if manifold.is_empty() {
        return None;
    }
    Some(NarrowPhaseContact {
        a: index_a,
        b: index_b,
        normal,
        manifold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyType, Material, RigidBody, Transform};
    use crate::math::Rotation;
    use crate::shape::Shape;

    #[test]
    fn static_box_overlapping_static_plane_produces_no_contact() {
        let plane = RigidBody::new(
            Transform::identity(),
            Shape::plane(Vector::Y, 0.0),
            BodyType::Static,
            Material::default(),
            0,
        );
        let boxy = RigidBody::new(
            Transform::new(Vector::new(0.0, 0.5, 0.0), Rotation::IDENTITY),
            Shape::cuboid(1.0, 1.0, 1.0),
            BodyType::Static,
            Material::default(),
            0,
        );
        assert!(narrow_phase_pair(0, 1, &plane, &boxy).is_none());
    }
}
