//! Convex shape primitives: [`Sphere`], [`Cuboid`], [`Plane`], unified
//! behind the [`Shape`] enum so the collision pipeline never has to match
//! on a trait object.
//!
//! # Implementation
//!
//! GJK, EPA, and the manifold builder never see a `Shape` directly — they
//! only call [`Shape::support`] and [`Shape::contact_feature`], both taking
//! a direction in the shape's *local* frame. [`RigidBody::support_world`]
//! is what bridges local and world space.

use crate::math::*;
use arrayvec::ArrayVec;

/// Maximum number of vertices a [`ContactFeature`] can hold: a box face has
/// four corners, a plane's synthetic face also has four.
pub const MAX_FEATURE_POINTS: usize = 4;

/// The vertices of a shape's contact feature (face, edge, or single point)
/// most aligned with a given direction, in whatever frame the caller asked
/// for (local or world).
pub type ContactFeature = ArrayVec<Vector, MAX_FEATURE_POINTS>;

/// An axis-aligned bounding box.
///
/// `overlaps` is inclusive: two boxes sharing only a face count as
/// overlapping (spec.md §8 boundary behavior).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector,
    pub max: Vector,
}

impl Aabb {
    pub fn new(min: Vector, max: Vector) -> Self {
        Self { min, max }
    }

    /// An `Aabb` that contains nothing; grown by [`Aabb::merge_point`].
    pub fn empty() -> Self {
        Self {
            min: Vector::splat(Scalar::INFINITY),
            max: Vector::splat(Scalar::NEG_INFINITY),
        }
    }

    pub fn merge_point(&mut self, p: Vector) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// A sphere of the given radius, centered on the owning body's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub radius: Scalar,
}

/// A box whose faces are axis-aligned in the owning body's local frame,
/// given as half-extents along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cuboid {
    pub half_extents: Vector,
}

/// An infinite plane: a unit normal and the signed distance from the world
/// origin to the plane along that normal. Always static (infinite mass,
/// zero inertia).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector,
    pub distance: Scalar,
}

/// A plane's AABB is represented with a large finite value rather than
/// true infinity, so that grid-cell math (`floor(x / cell_size)`) stays
/// well-defined. The plane bucket in the broad phase doesn't use this AABB
/// for indexing, but other code (e.g. a caller computing a world bounds)
/// may still read it.
const PLANE_HALF_EXTENT: Scalar = 1.0e6;
const PLANE_THICKNESS: Scalar = 1.0e-3;

/// A large synthetic half-extent for the plane's GJK support function: a
/// plane is an infinite half-space, but GJK/EPA need a finite operand to
/// compute Minkowski-difference support points against. This is only used
/// as a GJK fallback; the analytic plane collider (spec.md §4.7) is the
/// normal path and never calls this.
const PLANE_SUPPORT_EXTENT: Scalar = 1.0e6;

/// A convex collision shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere(Sphere),
    Cuboid(Cuboid),
    Plane(Plane),
}

impl Shape {
    pub fn sphere(radius: Scalar) -> Self {
        Shape::Sphere(Sphere { radius })
    }

    pub fn cuboid(hx: Scalar, hy: Scalar, hz: Scalar) -> Self {
        Shape::Cuboid(Cuboid {
            half_extents: Vector::new(hx, hy, hz),
        })
    }

    pub fn plane(normal: Vector, distance: Scalar) -> Self {
        Shape::Plane(Plane {
            normal: normal.normalize(),
            distance,
        })
    }

    pub fn is_plane(&self) -> bool {
        matches!(self, Shape::Plane(_))
    }

    /// World-space AABB for this shape under the given position/rotation.
    pub fn compute_aabb(&self, position: Vector, rotation: Rotation) -> Aabb {
        match self {
            Shape::Sphere(s) => Aabb::new(
                position - Vector::splat(s.radius),
                position + Vector::splat(s.radius),
            ),
            Shape::Cuboid(b) => {
                let mut aabb = Aabb::empty();
                for sx in [-1.0, 1.0] {
                    for sy in [-1.0, 1.0] {
                        for sz in [-1.0, 1.0] {
                            let local = Vector::new(
                                sx * b.half_extents.x,
                                sy * b.half_extents.y,
                                sz * b.half_extents.z,
                            );
                            aabb.merge_point(position + rotation * local);
                        }
                    }
                }
                aabb
            }
            Shape::Plane(p) => {
                // The slab is thin along the normal's dominant axis and
                // effectively unbounded on the other two.
                let n = p.normal;
                let abs = n.abs();
                let dominant = if abs.x >= abs.y && abs.x >= abs.z {
                    Vector::X
                } else if abs.y >= abs.z {
                    Vector::Y
                } else {
                    Vector::Z
                };
                let center = n * p.distance;
                let thin = dominant * PLANE_THICKNESS;
                let wide = (Vector::ONE - dominant) * PLANE_HALF_EXTENT;
                Aabb::new(center - thin - wide, center + thin + wide)
            }
        }
    }

    /// Mass from shape geometry and material density. Planes are always
    /// static and report infinite mass regardless of density.
    pub fn compute_mass(&self, density: Scalar) -> Scalar {
        match self {
            Shape::Sphere(s) => density * (4.0 / 3.0) * core::f32::consts::PI * s.radius.powi(3),
            Shape::Cuboid(b) => {
                density * 8.0 * b.half_extents.x * b.half_extents.y * b.half_extents.z
            }
            Shape::Plane(_) => Scalar::INFINITY,
        }
    }

    /// Local-space inertia tensor for a body of the given mass.
    pub fn compute_local_inertia(&self, mass: Scalar) -> Matrix3 {
        match self {
            Shape::Sphere(s) => {
                let i = 2.0 / 5.0 * mass * s.radius * s.radius;
                Matrix3::from_diagonal(Vector::splat(i))
            }
            Shape::Cuboid(b) => {
                let w = 2.0 * b.half_extents.x;
                let h = 2.0 * b.half_extents.y;
                let d = 2.0 * b.half_extents.z;
                let ix = mass / 12.0 * (h * h + d * d);
                let iy = mass / 12.0 * (w * w + d * d);
                let iz = mass / 12.0 * (w * w + h * h);
                Matrix3::from_diagonal(Vector::new(ix, iy, iz))
            }
            Shape::Plane(_) => Matrix3::ZERO,
        }
    }

    /// The farthest point of the shape, in its own local frame, along `d`.
    pub fn support(&self, d: Vector) -> Vector {
        match self {
            Shape::Sphere(s) => {
                if d.length_squared() < DEGENERATE_LENGTH_SQ {
                    Vector::ZERO
                } else {
                    d.normalize() * s.radius
                }
            }
            Shape::Cuboid(b) => Vector::new(
                signed_extent(d.x, b.half_extents.x),
                signed_extent(d.y, b.half_extents.y),
                signed_extent(d.z, b.half_extents.z),
            ),
            Shape::Plane(p) => {
                // A point on a very large box tangent to the plane: walk
                // out along the tangent component of `d` as far as
                // `PLANE_SUPPORT_EXTENT` allows, and along the normal only
                // as far as the plane itself (the half-space has no
                // support in the outward normal direction). Used only as
                // a GJK fallback; the analytic plane path (spec.md §4.7)
                // is the normal route and never calls this.
                let tangent = d - p.normal * d.dot(p.normal);
                let tangent_offset = if tangent.length_squared() < DEGENERATE_LENGTH_SQ {
                    Vector::ZERO
                } else {
                    tangent.normalize() * PLANE_SUPPORT_EXTENT
                };
                p.normal * p.distance + tangent_offset
            }
        }
    }

    /// The vertices (1-4) of the local-space feature most aligned with `d`.
    pub fn contact_feature(&self, d: Vector) -> ContactFeature {
        match self {
            Shape::Sphere(s) => {
                let mut f = ContactFeature::new();
                f.push(self.support(d));
                let _ = s;
                f
            }
            Shape::Cuboid(b) => cuboid_face_feature(b, d),
            Shape::Plane(p) => plane_face_feature(p),
        }
    }
}

fn signed_extent(component: Scalar, half_extent: Scalar) -> Scalar {
    if component >= 0.0 {
        half_extent
    } else {
        -half_extent
    }
}

/// Orthonormal tangent basis for a plane normal, per spec.md §4.1:
/// `e1 = (1,0,0)` unless `n` is nearly aligned with X, then `(0,1,0)`.
pub fn tangent_basis(n: Vector) -> (Vector, Vector) {
    let e1 = if n.x.abs() <= 0.9 {
        Vector::X
    } else {
        Vector::Y
    };
    let t1 = (e1 - n * e1.dot(n)).normalize();
    let t2 = n.cross(t1).normalize();
    (t1, t2)
}

fn cuboid_face_feature(b: &Cuboid, d: Vector) -> ContactFeature {
    // Six axis-aligned face normals; pick the one with the largest dot
    // product against `d`.
    let candidates = [
        (Vector::X, b.half_extents.x),
        (Vector::NEG_X, b.half_extents.x),
        (Vector::Y, b.half_extents.y),
        (Vector::NEG_Y, b.half_extents.y),
        (Vector::Z, b.half_extents.z),
        (Vector::NEG_Z, b.half_extents.z),
    ];
    let (axis, _) = candidates
        .iter()
        .copied()
        .max_by(|(na, _), (nb, _)| na.dot(d).partial_cmp(&nb.dot(d)).unwrap())
        .unwrap();

    let he = b.half_extents;
    let mut verts = ContactFeature::new();
    if axis.x != 0.0 {
        let x = axis.x * he.x;
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                verts.push(Vector::new(x, sy * he.y, sz * he.z));
            }
        }
    } else if axis.y != 0.0 {
        let y = axis.y * he.y;
        for sx in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                verts.push(Vector::new(sx * he.x, y, sz * he.z));
            }
        }
    } else {
        let z = axis.z * he.z;
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                verts.push(Vector::new(sx * he.x, sy * he.y, z));
            }
        }
    }
    verts
}

fn plane_face_feature(p: &Plane) -> ContactFeature {
    let (t1, t2) = tangent_basis(p.normal);
    let center = p.normal * p.distance;
    let mut verts = ContactFeature::new();
    for s1 in [-1.0, 1.0] {
        for s2 in [-1.0, 1.0] {
            verts.push(center + t1 * (s1 * PLANE_HALF_EXTENT) + t2 * (s2 * PLANE_HALF_EXTENT));
        }
    }
    verts
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sphere_aabb_ignores_rotation() {
        let s = Shape::sphere(2.0);
        let aabb = s.compute_aabb(Vector::new(1.0, 2.0, 3.0), Rotation::from_rotation_y(1.2));
        assert_relative_eq!(aabb.min, Vector::new(-1.0, 0.0, 1.0));
        assert_relative_eq!(aabb.max, Vector::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn aabb_touching_faces_overlap() {
        let a = Aabb::new(Vector::ZERO, Vector::ONE);
        let b = Aabb::new(Vector::ONE, Vector::splat(2.0));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn compute_aabb_is_idempotent() {
        let s = Shape::cuboid(1.0, 2.0, 3.0);
        let pos = Vector::new(0.5, -1.0, 2.0);
        let rot = Rotation::from_rotation_x(0.4);
        let a = s.compute_aabb(pos, rot);
        let b = s.compute_aabb(pos, rot);
        assert_eq!(a, b);
    }

    #[test]
    fn cuboid_support_picks_matching_octant() {
        let b = Shape::cuboid(1.0, 2.0, 3.0);
        let s = b.support(Vector::new(1.0, -1.0, 1.0));
        assert_relative_eq!(s, Vector::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn cuboid_mass_and_inertia() {
        let b = Shape::cuboid(1.0, 1.0, 1.0);
        let m = b.compute_mass(1.0);
        assert_relative_eq!(m, 8.0);
        let i = b.compute_local_inertia(m);
        // A cube's inertia tensor is isotropic.
        assert_relative_eq!(i.x_axis.x, i.y_axis.y, epsilon = 1e-5);
        assert_relative_eq!(i.y_axis.y, i.z_axis.z, epsilon = 1e-5);
    }

    #[test]
    fn plane_contact_feature_has_four_points() {
        let p = Shape::plane(Vector::Y, 0.0);
        let f = p.contact_feature(Vector::Y);
        assert_eq!(f.len(), 4);
        for v in &f {
            assert_relative_eq!(v.y, 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn tangent_basis_is_orthonormal() {
        for n in [Vector::X, Vector::Y, Vector::Z, Vector::new(1.0, 1.0, 1.0).normalize()] {
            let (t1, t2) = tangent_basis(n);
            assert_relative_eq!(t1.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(t2.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(t1.dot(n), 0.0, epsilon = 1e-5);
            assert_relative_eq!(t2.dot(n), 0.0, epsilon = 1e-5);
            assert_relative_eq!(t1.dot(t2), 0.0, epsilon = 1e-5);
        }
    }
}
