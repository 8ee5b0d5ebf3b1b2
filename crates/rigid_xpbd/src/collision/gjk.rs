//! Gilbert-Johnson-Keerthi convex overlap test.
//!
//! # Implementation
//!
//! The simplex is a fixed-capacity `ArrayVec<Vector, 4>` (no per-call heap
//! allocation on the hot path, matching the engine's scratch-buffer
//! discipline). [`gjk_overlap`] drives the loop described in spec.md §4.4.
//! When it reports overlap, the returned simplex is usually a terminating
//! four-point tetrahedron enclosing the origin, ready for
//! [`crate::collision::epa::epa_penetration`] to consume directly — except
//! for the degenerate case where the origin lands exactly on a reduced
//! simplex's line or point, which is also reported as overlap but can leave
//! fewer than four points. `epa_penetration` treats that as "no contact
//! this substep" rather than indexing past the simplex's end.
//!
//! Points are always stored oldest-first; the most recently added support
//! point is the last element.

use crate::body::RigidBody;
use crate::math::*;
use arrayvec::ArrayVec;
use tracing::warn;

const MAX_ITERATIONS: u32 = 32;
const ORIGIN_EPSILON_SQ: Scalar = 1e-16;

pub type Simplex = ArrayVec<Vector, 4>;

/// `support(A, d) - support(B, -d)`, in world space.
pub fn minkowski_support(a: &RigidBody, b: &RigidBody, d: Vector) -> Vector {
    a.support_world(d) - b.support_world(-d)
}

/// Does the Minkowski difference of `a` and `b` contain the origin?
///
/// Returns `(overlap, simplex)`. When `overlap` is `true` the simplex is
/// usually a terminating four-point tetrahedron, but a degenerate
/// containment (origin exactly on a line or at a single support point) can
/// report `true` with fewer points; callers must not assume length 4.
pub fn gjk_overlap(a: &RigidBody, b: &RigidBody) -> (bool, Simplex) {
    let mut d = b.transform.position - a.transform.position;
    if d.length_squared() < ORIGIN_EPSILON_SQ {
        d = Vector::X;
    }

    let mut simplex: Simplex = ArrayVec::new();
    let p0 = minkowski_support(a, b, d);
    simplex.push(p0);
    if p0.length_squared() < ORIGIN_EPSILON_SQ {
        return (true, simplex);
    }
    d = -p0;

    for _ in 0..MAX_ITERATIONS {
        let p = minkowski_support(a, b, d);
        if p.dot(d) <= 0.0 {
            return (false, simplex);
        }
        simplex.push(p);

        let (contains, next_d) = reduce_simplex(&mut simplex);
        if contains {
            return (true, simplex);
        }
        d = next_d;
    }
    warn!("GJK hit its iteration cap without resolving overlap");
    (false, simplex)
}

/// Reduces `simplex` in place to the feature of the Voronoi region closest
/// to the origin, discarding points outside it. Returns `(contains_origin,
/// next_search_direction)`; `next_search_direction` is meaningless when
/// `contains_origin` is true.
fn reduce_simplex(simplex: &mut Simplex) -> (bool, Vector) {
    match simplex.len() {
        2 => reduce_line(simplex),
        3 => reduce_triangle(simplex),
        4 => reduce_tetrahedron(simplex),
        _ => unreachable!("simplex grows by exactly one point per GJK iteration"),
    }
}

/// Two points `[B, A]` (A most recent). Keeps `A` alone, or `[B, A]`.
/// Reports containment directly when the origin lies exactly on segment
/// AB, per spec.md §4.4, rather than leaving it to be caught by the next
/// iteration's support-dot-direction check.
fn reduce_line(simplex: &mut Simplex) -> (bool, Vector) {
    let a = simplex[1];
    let b = simplex[0];
    let ab = b - a;
    let ao = -a;

    if ab.dot(ao) <= 0.0 {
        simplex.clear();
        simplex.push(a);
        return (false, ao);
    }

    let cross = ab.cross(ao);
    if cross.length_squared() < ORIGIN_EPSILON_SQ {
        return (true, Vector::ZERO);
    }

    (false, cross.cross(ab))
}

/// Three points `[C, B, A]` (A most recent). Keeps a line or `[C, B, A]`
/// (possibly winding-flipped to `[B, C, A]`).
fn reduce_triangle(simplex: &mut Simplex) -> (bool, Vector) {
    let a = simplex[2];
    let b = simplex[1];
    let c = simplex[0];
    let ab = b - a;
    let ac = c - a;
    let ao = -a;
    let abc = ab.cross(ac);

    if abc.length_squared() < ORIGIN_EPSILON_SQ {
        simplex.clear();
        simplex.push(b);
        simplex.push(a);
        return reduce_line(simplex);
    }

    let ab_perp = ab.cross(abc);
    if ab_perp.dot(ao) > 0.0 {
        simplex.clear();
        simplex.push(b);
        simplex.push(a);
        return reduce_line(simplex);
    }

    let ac_perp = abc.cross(ac);
    if ac_perp.dot(ao) > 0.0 {
        simplex.clear();
        simplex.push(c);
        simplex.push(a);
        return reduce_line(simplex);
    }

    if abc.dot(ao) > 0.0 {
        simplex.clear();
        simplex.push(c);
        simplex.push(b);
        simplex.push(a);
        (false, abc)
    } else {
        simplex.clear();
        simplex.push(b);
        simplex.push(c);
        simplex.push(a);
        (false, -abc)
    }
}

/// Four points `[D, C, B, A]` (A most recent). Either reduces to a
/// triangle face and recurses, or reports containment.
fn reduce_tetrahedron(simplex: &mut Simplex) -> (bool, Vector) {
    let a = simplex[3];
    let b = simplex[2];
    let c = simplex[1];
    let d = simplex[0];
    let ao = -a;

    // Each candidate face is (fa, fb, fc) with `opposite` the fourth
    // vertex, used only to orient the face normal outward.
    let faces = [(a, b, c, d), (a, c, d, b), (a, d, b, c)];

    for (fa, fb, fc, opposite) in faces {
        let mut normal = (fb - fa).cross(fc - fa);
        if normal.dot(opposite - fa) > 0.0 {
            normal = -normal;
        }
        if normal.dot(ao) > 0.0 {
            simplex.clear();
            simplex.push(fc);
            simplex.push(fb);
            simplex.push(fa);
            return reduce_triangle(simplex);
        }
    }

    // Origin is on the inside of all four faces: the tetrahedron encloses
    // it. Restore the original four-point simplex for EPA to consume.
    simplex.clear();
    simplex.push(d);
    simplex.push(c);
    simplex.push(b);
    simplex.push(a);
    (true, Vector::ZERO)
}
