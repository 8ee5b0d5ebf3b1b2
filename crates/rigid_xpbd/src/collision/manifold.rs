//! Sutherland-Hodgman contact manifold generation.
//!
//! # Implementation
//!
//! Every buffer here is a fixed-capacity `ArrayVec` of at least 8 entries,
//! per spec.md §4.6's "no per-call heap allocation on the hot path"
//! requirement — the clipping ping-pongs between two scratch buffers owned
//! by the caller's stack frame rather than a pooled allocator, since this
//! core has no persistent per-worker state to pool them in yet (see
//! [`crate::world::World::narrow_phase`] for where a future pool would
//! plug in).

use crate::body::RigidBody;
use crate::math::*;
use crate::shape::{tangent_basis, ContactFeature};
use arrayvec::ArrayVec;

const SCRATCH_CAPACITY: usize = 16;

/// A single contact point with its penetration depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub position: Vector,
    pub depth: Scalar,
}

pub type Manifold = ArrayVec<ContactPoint, 4>;

type Scratch = ArrayVec<Vector, SCRATCH_CAPACITY>;

/// Builds a 1-4 point manifold from a contact normal (A toward B) and
/// penetration depth, per spec.md §4.6.
pub fn build_manifold(a: &RigidBody, b: &RigidBody, normal: Vector, depth: Scalar) -> Manifold {
    let local_normal_a = a.transform.inverse_rotation() * normal;
    let local_normal_b = b.transform.inverse_rotation() * (-normal);

    let feature_a = to_world(a, a.shape.contact_feature(local_normal_a));
    let feature_b = to_world(b, b.shape.contact_feature(local_normal_b));

    let (reference, incident) = if feature_a.len() <= feature_b.len() {
        (feature_b, feature_a)
    } else {
        (feature_a, feature_b)
    };

    if incident.len() == 1 {
        let mut m = Manifold::new();
        m.push(ContactPoint {
            position: incident[0],
            depth,
        });
        return m;
    }

    let mut points: Scratch = incident.iter().copied().collect();

    if reference.len() >= 2 {
        let centroid = centroid_of(&reference);
        let n = reference.len();
        for i in 0..n {
            let v1 = reference[i];
            let v2 = reference[(i + 1) % n];
            let edge = v2 - v1;
            let mut side_normal = edge.cross(normal);
            if side_normal.length_squared() < 1e-12 {
                continue;
            }
            side_normal = side_normal.normalize();
            if side_normal.dot(centroid - v1) < 0.0 {
                side_normal = -side_normal;
            }
            points = clip_polygon(&points, v1, side_normal);
            if points.is_empty() {
                break;
            }
        }
    }

    if reference.len() >= 3 {
        let v0 = reference[0];
        let v1 = reference[1];
        let v2 = reference[2];
        let mut face_normal = (v1 - v0).cross(v2 - v0);
        if face_normal.length_squared() > 1e-12 {
            face_normal = face_normal.normalize();
            if face_normal.dot(normal) < 0.0 {
                face_normal = -face_normal;
            }
            let offset = v0.dot(face_normal);
            points = points
                .into_iter()
                .filter(|p| p.dot(face_normal) - offset <= 1e-4)
                .collect();
        }
    }

    if points.is_empty() {
        // Fallback: the deepest support point of B in -normal.
        let mut m = Manifold::new();
        m.push(ContactPoint {
            position: b.support_world(-normal),
            depth,
        });
        return m;
    }

    if points.len() > 4 {
        points = reduce_to_four(&points, normal);
    }

    points
        .into_iter()
        .map(|position| ContactPoint { position, depth })
        .collect()
}

fn to_world(body: &RigidBody, local: ContactFeature) -> ContactFeature {
    local
        .into_iter()
        .map(|v| body.transform.rotation() * v + body.transform.position)
        .collect()
}

fn centroid_of(points: &ContactFeature) -> Vector {
    points.iter().copied().sum::<Vector>() / points.len() as Scalar
}

/// Clips `polygon` against the half-space `{p : (p - plane_point) . plane_normal <= 0}`.
fn clip_polygon(polygon: &Scratch, plane_point: Vector, plane_normal: Vector) -> Scratch {
    let mut output = Scratch::new();
    let n = polygon.len();
    if n == 0 {
        return output;
    }
    for i in 0..n {
        let current = polygon[i];
        let prev = polygon[(i + n - 1) % n];

        let current_dist = (current - plane_point).dot(plane_normal);
        let prev_dist = (prev - plane_point).dot(plane_normal);

        let current_inside = current_dist <= 0.0;
        let prev_inside = prev_dist <= 0.0;

        if current_inside {
            if !prev_inside {
                if let Some(i) = segment_plane_intersection(prev, current, plane_point, plane_normal) {
                    let _ = output.try_push(i);
                }
            }
            let _ = output.try_push(current);
        } else if prev_inside {
            if let Some(i) = segment_plane_intersection(prev, current, plane_point, plane_normal) {
                let _ = output.try_push(i);
            }
        }
    }
    output
}

fn segment_plane_intersection(
    a: Vector,
    b: Vector,
    plane_point: Vector,
    plane_normal: Vector,
) -> Option<Vector> {
    let da = (a - plane_point).dot(plane_normal);
    let db = (b - plane_point).dot(plane_normal);
    let denom = da - db;
    if denom.abs() < 1e-10 {
        return None;
    }
    let t = da / denom;
    Some(a + (b - a) * t)
}

/// Reduces an overcomplete point set to (up to) four, keeping the extremes
/// along each axis of an orthonormal tangent basis of `normal`.
fn reduce_to_four(points: &Scratch, normal: Vector) -> Scratch {
    let (t1, t2) = tangent_basis(normal);
    let mut indices: ArrayVec<usize, 4> = ArrayVec::new();

    let mut push_extreme = |proj: &dyn Fn(Vector) -> Scalar, want_max: bool| {
        let mut best_idx = 0usize;
        let mut best_val = proj(points[0]);
        for (i, p) in points.iter().enumerate().skip(1) {
            let v = proj(*p);
            if (want_max && v > best_val) || (!want_max && v < best_val) {
                best_val = v;
                best_idx = i;
            }
        }
        if !indices.contains(&best_idx) {
            let _ = indices.try_push(best_idx);
        }
    };

    push_extreme(&|p| p.dot(t1), true);
    push_extreme(&|p| p.dot(t1), false);
    push_extreme(&|p| p.dot(t2), true);
    push_extreme(&|p| p.dot(t2), false);

    indices.into_iter().map(|i| points[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyType, Material, RigidBody, Transform};
    use crate::shape::Shape;

    #[test]
    fn box_on_box_face_produces_four_points() {
        let a = RigidBody::new(
            Transform::identity(),
            Shape::cuboid(1.0, 1.0, 1.0),
            BodyType::Dynamic,
            Material::default(),
            0,
        );
        let b = RigidBody::new(
            Transform::new(Vector::new(0.0, 1.9, 0.0), Rotation::IDENTITY),
            Shape::cuboid(1.0, 1.0, 1.0),
            BodyType::Dynamic,
            Material::default(),
            0,
        );
        let manifold = build_manifold(&a, &b, Vector::Y, 0.1);
        assert!(!manifold.is_empty());
        assert!(manifold.len() <= 4);
        for c in &manifold {
            assert_relative_eq_depth(c.depth, 0.1);
        }
    }

    #[test]
    fn sphere_on_box_produces_single_point() {
        let a = RigidBody::new(
            Transform::identity(),
            Shape::cuboid(1.0, 1.0, 1.0),
            BodyType::Dynamic,
            Material::default(),
            0,
        );
        let b = RigidBody::new(
            Transform::new(Vector::new(0.0, 1.9, 0.0), Rotation::IDENTITY),
            Shape::sphere(1.0),
            BodyType::Dynamic,
            Material::default(),
            0,
        );
        let manifold = build_manifold(&a, &b, Vector::Y, 0.1);
        assert_eq!(manifold.len(), 1);
    }

    fn assert_relative_eq_depth(got: Scalar, expected: Scalar) {
        assert!((got - expected).abs() < 1e-4, "{got} != {expected}");
    }
}
