//! Expanding Polytope Algorithm: penetration depth and contact normal from
//! a GJK-terminating simplex.
//!
//! # Implementation
//!
//! The polytope's face list is a fixed-capacity `ArrayVec`, sized generously
//! enough for the handful of expansion iterations EPA needs in practice
//! (spec.md §9's "no per-call heap allocation on the hot path"). Horizon
//! detection uses a small fixed-capacity edge list rather than a hash set.

use crate::body::RigidBody;
use crate::collision::gjk::{minkowski_support, Simplex};
use crate::math::*;
use arrayvec::ArrayVec;
use tracing::warn;

const MAX_ITERATIONS: u32 = 32;
const MAX_FACES: usize = 64;
const MAX_VERTICES: usize = 64;
const DEGENERACY_FLOOR: Scalar = 1e-4;
const CONVERGENCE_EPSILON: Scalar = 0.001;
const NORMAL_SNAP_EPSILON: Scalar = 1e-8;

#[derive(Debug, Clone, Copy)]
struct Face {
    vertices: [Vector; 3],
    normal: Vector,
    distance: Scalar,
}

fn snap_normal(n: Vector) -> Vector {
    let snapped = Vector::new(
        if n.x.abs() < NORMAL_SNAP_EPSILON { 0.0 } else { n.x },
        if n.y.abs() < NORMAL_SNAP_EPSILON { 0.0 } else { n.y },
        if n.z.abs() < NORMAL_SNAP_EPSILON { 0.0 } else { n.z },
    );
    if snapped.length_squared() < DEGENERATE_LENGTH_SQ {
        n
    } else {
        snapped.normalize()
    }
}

/// Builds a face from three vertices, oriented outward relative to
/// `opposite` (the simplex's fourth vertex), per spec.md §4.5 Initialization.
fn make_face(a: Vector, b: Vector, c: Vector, opposite: Vector) -> Option<Face> {
    let mut n = (b - a).cross(c - a);
    if n.length_squared() < DEGENERATE_LENGTH_SQ {
        return None;
    }
    n = n.normalize();
    if n.dot(opposite - a) > 0.0 {
        n = -n;
    }
    let mut distance = a.dot(n);
    if distance < 0.0 {
        n = -n;
        distance = -distance;
    }
    let distance = distance.max(DEGENERACY_FLOOR);
    let n = snap_normal(n);
    Some(Face {
        vertices: [a, b, c],
        normal: n,
        distance,
    })
}

fn initial_faces(simplex: &Simplex) -> ArrayVec<Face, MAX_FACES> {
    let d = simplex[0];
    let c = simplex[1];
    let b = simplex[2];
    let a = simplex[3];

    let mut faces = ArrayVec::new();
    for (fa, fb, fc, opposite) in [(a, b, c, d), (a, c, d, b), (a, d, b, c), (b, d, c, a)] {
        if let Some(face) = make_face(fa, fb, fc, opposite) {
            faces.push(face);
        }
    }
    faces
}

/// An edge, stored with endpoints in a canonical (lexicographic-by-bits)
/// order so two faces sharing an edge produce identical keys regardless of
/// winding.
#[derive(Clone, Copy, PartialEq)]
struct Edge(Vector, Vector);

fn canonical_edge(a: Vector, b: Vector) -> Edge {
    fn key(v: Vector) -> (u32, u32, u32) {
        (v.x.to_bits(), v.y.to_bits(), v.z.to_bits())
    }
    if key(a) <= key(b) {
        Edge(a, b)
    } else {
        Edge(b, a)
    }
}

/// Given an enclosing simplex, returns `(normal, depth)` or `None` if the
/// iteration cap is hit before convergence.
pub fn epa_penetration(a: &RigidBody, b: &RigidBody, simplex: &Simplex) -> Option<(Vector, Scalar)> {
    // GJK can report containment from a degenerate reduction (e.g. the
    // origin lying exactly on a simplex edge) without having built a full
    // enclosing tetrahedron. EPA needs four points to seed its initial
    // faces, so treat anything short of that as "no contact this substep"
    // rather than indexing past the simplex's end.
    if simplex.len() < 4 {
        warn!(
            len = simplex.len(),
            "EPA entered with a non-tetrahedron simplex; skipping this contact"
        );
        return None;
    }

    let mut faces = initial_faces(simplex);
    if faces.is_empty() {
        warn!("EPA could not build a non-degenerate initial face; skipping this contact");
        return None;
    }

    for _ in 0..MAX_ITERATIONS {
        // Find the face closest to the origin, skipping degenerate ones.
        let mut best: Option<usize> = None;
        loop {
            let candidate = faces
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != best)
                .min_by(|(_, x), (_, y)| x.distance.partial_cmp(&y.distance).unwrap());
            match candidate {
                None => {
                    warn!("EPA ran out of non-degenerate faces before converging");
                    return None;
                }
                Some((i, f)) => {
                    if f.distance <= DEGENERACY_FLOOR && faces.len() > 1 {
                        // Discard and retry: remove this degenerate face.
                        faces.remove(i);
                        best = None;
                        continue;
                    }
                    best = Some(i);
                    break;
                }
            }
        }
        let face_index = best.unwrap();
        let face = faces[face_index];

        let support = minkowski_support(a, b, face.normal);
        let d = support.dot(face.normal);

        if d - face.distance < CONVERGENCE_EPSILON {
            return Some((face.normal, d.max(0.0)));
        }

        expand(&mut faces, support);
    }
    warn!("EPA hit its iteration cap without converging");
    None
}

fn expand(faces: &mut ArrayVec<Face, MAX_FACES>, support: Vector) {
    let mut vertices: ArrayVec<Vector, MAX_VERTICES> = ArrayVec::new();
    for f in faces.iter() {
        for v in f.vertices {
            if !vertices.iter().any(|existing| *existing == v) {
                let _ = vertices.try_push(v);
            }
        }
    }
    let centroid = if vertices.is_empty() {
        Vector::ZERO
    } else {
        vertices.iter().copied().sum::<Vector>() / vertices.len() as Scalar
    };

    let mut visible: ArrayVec<usize, MAX_FACES> = ArrayVec::new();
    for (i, f) in faces.iter().enumerate() {
        if (support - f.vertices[0]).dot(f.normal) > 0.0 {
            let _ = visible.try_push(i);
        }
    }
    if visible.len() == faces.len() {
        // Safety: keep only the closest face visible.
        let closest = faces
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| x.distance.partial_cmp(&y.distance).unwrap())
            .map(|(i, _)| i);
        visible.clear();
        if let Some(i) = closest {
            let _ = visible.try_push(i);
        }
    }

    let mut edge_counts: ArrayVec<(Edge, u8), 256> = ArrayVec::new();
    for &i in visible.iter() {
        let f = faces[i];
        let edges = [
            canonical_edge(f.vertices[0], f.vertices[1]),
            canonical_edge(f.vertices[1], f.vertices[2]),
            canonical_edge(f.vertices[2], f.vertices[0]),
        ];
        for e in edges {
            if let Some(entry) = edge_counts.iter_mut().find(|(existing, _)| {
                existing.0 == e.0 && existing.1 == e.1
            }) {
                entry.1 += 1;
            } else {
                let _ = edge_counts.try_push((e, 1));
            }
        }
    }
    let horizon: ArrayVec<Edge, 256> = edge_counts
        .into_iter()
        .filter(|(_, count)| *count == 1)
        .map(|(e, _)| e)
        .collect();

    // Remove visible faces, highest index first so earlier indices stay valid.
    let mut visible_sorted: ArrayVec<usize, MAX_FACES> = visible;
    visible_sorted.sort_unstable_by(|a, b| b.cmp(a));
    for i in visible_sorted {
        faces.remove(i);
    }

    for edge in horizon {
        if faces.is_full() {
            break;
        }
        if let Some(new_face) = make_face(edge.0, edge.1, support, centroid) {
            let _ = faces.try_push(new_face);
        }
    }
}
