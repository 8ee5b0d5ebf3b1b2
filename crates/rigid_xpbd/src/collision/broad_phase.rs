//! Uniform spatial hash grid broad phase.
//!
//! # Implementation
//!
//! Buckets are flat `Vec<u32>` lists rather than open-addressed slots,
//! matching spec.md §4.3's explicit rejection of open addressing. Planes
//! get a dedicated bucket since their AABBs are synthetic large-but-finite
//! slabs that would otherwise flood every cell they touch.
//!
//! [`SpatialGrid::find_pairs`] partitions bodies into `workers` contiguous
//! ranges and runs them with `rayon`'s scoped thread pool, one per-worker
//! "seen" scratch bitmap each — this is the crate's one genuinely
//! parallel, allocation-per-call-free hot loop.

use crate::body::RigidBody;
use crate::math::Scalar;
use rayon::prelude::*;

/// A candidate pair of body indices into the world's body array, with
/// `a < b` always (spec.md §5 ordering guarantee).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub a: u32,
    pub b: u32,
}

pub struct SpatialGrid {
    cell_size: Scalar,
    buckets: Vec<Vec<u32>>,
    planes: Vec<u32>,
}

fn hash_cell(x: i32, y: i32, z: i32) -> u32 {
    // MurmurHash-style integer mixer: multiply each coordinate by a large
    // odd prime, XOR-fold together.
    const P1: u32 = 0x85eb_ca6b;
    const P2: u32 = 0xc2b2_ae35;
    const P3: u32 = 0x27d4_eb2f;
    let ux = (x as u32).wrapping_mul(P1);
    let uy = (y as u32).wrapping_mul(P2);
    let uz = (z as u32).wrapping_mul(P3);
    let mut h = ux ^ uy ^ uz;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

impl SpatialGrid {
    pub fn new(cell_size: Scalar, bucket_count: usize) -> Self {
        Self {
            cell_size,
            buckets: vec![Vec::new(); bucket_count.max(1)],
            planes: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.planes.clear();
    }

    fn cell_of(&self, p: glam::Vec3) -> (i32, i32, i32) {
        (
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
            (p.z / self.cell_size).floor() as i32,
        )
    }

    fn bucket_index(&self, cell: (i32, i32, i32)) -> usize {
        hash_cell(cell.0, cell.1, cell.2) as usize % self.buckets.len()
    }

    pub fn insert(&mut self, body_index: u32, body: &RigidBody) {
        if body.shape.is_plane() {
            self.planes.push(body_index);
            return;
        }
        let aabb = body.aabb();
        let (min_x, min_y, min_z) = self.cell_of(aabb.min);
        let (max_x, max_y, max_z) = self.cell_of(aabb.max);
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                for z in min_z..=max_z {
                    let idx = self.bucket_index((x, y, z));
                    self.buckets[idx].push(body_index);
                }
            }
        }
    }

    pub fn sort_cells(&mut self) {
        for bucket in &mut self.buckets {
            bucket.sort_unstable();
        }
        self.planes.sort_unstable();
    }

    pub fn rebuild(&mut self, bodies: &[RigidBody]) {
        self.clear();
        for (i, body) in bodies.iter().enumerate() {
            self.insert(i as u32, body);
        }
        self.sort_cells();
    }

    /// Produces every candidate pair, partitioning work across `workers`
    /// contiguous body-index ranges, per spec.md §4.3.
    pub fn find_pairs(&self, bodies: &[RigidBody], workers: usize) -> Vec<Pair> {
        let workers = workers.max(1);
        let n = bodies.len();
        if n == 0 {
            return Vec::new();
        }
        let chunk = n.div_ceil(workers);

        (0..workers)
            .into_par_iter()
            .flat_map(|w| {
                let start = w * chunk;
                let end = (start + chunk).min(n);
                if start >= end {
                    return Vec::new();
                }
                self.find_pairs_in_range(bodies, start, end)
            })
            .collect()
    }

    fn find_pairs_in_range(&self, bodies: &[RigidBody], start: usize, end: usize) -> Vec<Pair> {
        let mut out = Vec::new();
        let mut seen = vec![false; bodies.len()];

        for i in start..end {
            let body_i = &bodies[i];
            if body_i.shape.is_plane() {
                continue;
            }

            for &plane_idx in &self.planes {
                out.push(ordered_pair(plane_idx, i as u32));
            }

            for v in seen.iter_mut() {
                *v = false;
            }

            let aabb = body_i.aabb();
            let (min_x, min_y, min_z) = self.cell_of(aabb.min);
            let (max_x, max_y, max_z) = self.cell_of(aabb.max);

            for x in min_x..=max_x {
                for y in min_y..=max_y {
                    for z in min_z..=max_z {
                        let idx = self.bucket_index((x, y, z));
                        for &j in &self.buckets[idx] {
                            if j as usize <= i {
                                continue;
                            }
                            if seen[j as usize] {
                                continue;
                            }
                            seen[j as usize] = true;

                            let body_j = &bodies[j as usize];
                            if body_i.is_static() && body_j.is_static() {
                                continue;
                            }
                            if body_i.is_sleeping() && body_j.is_sleeping() {
                                continue;
                            }
                            if aabb.overlaps(&body_j.aabb()) {
                                out.push(Pair { a: i as u32, b: j });
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

fn ordered_pair(a: u32, b: u32) -> Pair {
    if a < b {
        Pair { a, b }
    } else {
        Pair { a: b, b: a }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyType, Material, RigidBody, Transform};
    use crate::math::Vector;
    use crate::shape::Shape;

    fn sphere_at(x: Scalar) -> RigidBody {
        RigidBody::new(
            Transform::new(Vector::new(x, 0.0, 0.0), glam::Quat::IDENTITY),
            Shape::sphere(1.0),
            BodyType::Dynamic,
            Material::default(),
            0,
        )
    }

    #[test]
    fn overlapping_bodies_produce_a_pair() {
        let bodies = vec![sphere_at(0.0), sphere_at(1.5)];
        let mut grid = SpatialGrid::new(2.0, 64);
        grid.rebuild(&bodies);
        let pairs = grid.find_pairs(&bodies, 2);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0], Pair { a: 0, b: 1 });
    }

    #[test]
    fn distant_bodies_produce_no_pair() {
        let bodies = vec![sphere_at(0.0), sphere_at(100.0)];
        let mut grid = SpatialGrid::new(2.0, 64);
        grid.rebuild(&bodies);
        let pairs = grid.find_pairs(&bodies, 2);
        assert!(pairs.is_empty());
    }

    #[test]
    fn plane_pairs_with_every_other_body_unconditionally() {
        let mut bodies = vec![RigidBody::new(
            Transform::identity(),
            Shape::plane(Vector::Y, 0.0),
            BodyType::Static,
            Material::default(),
            0,
        )];
        bodies.push(sphere_at(1_000.0));
        let mut grid = SpatialGrid::new(2.0, 64);
        grid.rebuild(&bodies);
        let pairs = grid.find_pairs(&bodies, 1);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0], Pair { a: 0, b: 1 });
    }

    #[test]
    fn static_static_pair_is_suppressed() {
        let bodies = vec![
            RigidBody::new(
                Transform::identity(),
                Shape::cuboid(1.0, 1.0, 1.0),
                BodyType::Static,
                Material::default(),
                0,
            ),
            RigidBody::new(
                Transform::new(Vector::new(0.5, 0.0, 0.0), glam::Quat::IDENTITY),
                Shape::cuboid(1.0, 1.0, 1.0),
                BodyType::Static,
                Material::default(),
                0,
            ),
        ];
        let mut grid = SpatialGrid::new(2.0, 64);
        grid.rebuild(&bodies);
        let pairs = grid.find_pairs(&bodies, 2);
        assert!(pairs.is_empty());
    }
}
