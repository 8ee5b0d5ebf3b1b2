//! The substepped pipeline orchestrator, tying together every other module
//! behind a small public surface.
//!
//! # Implementation
//!
//! Bodies live in a dense `Vec<RigidBody>` so broad phase, narrow phase,
//! and the parallel integration/update/sleep passes can all index it
//! directly with no indirection. [`BodyHandle`] is a separate generational
//! index: `slot_meta[handle.index]` tracks the handle's generation and its
//! current position in the dense array, so inserting/removing bodies never
//! requires touching live handles elsewhere. Removal is a `swap_remove`,
//! which is why the moved element's slot metadata is patched afterward.
//!
//! Fork-join phases (integration, `update`, `try_sleep`) run on a
//! dedicated [`rayon::ThreadPool`] sized from [`PhysicsConfig::workers`]
//! rather than the global pool, so embedding applications that also use
//! rayon elsewhere aren't starved.
//!
//! # Steps
//!
//! [`World::step`] runs, for each of `substeps` equal-duration slices:
//! 1. Integrate every awake dynamic body in parallel (this also refreshes
//!    AABBs; spec.md §4.9's explicit AABB-recompute step is redundant here).
//! 2. Rebuild the spatial grid and stream broad-phase pairs.
//! 3. Run the narrow phase (GJK+EPA+manifold, or the plane-analytic path)
//!    over those pairs in parallel, merging into one contact list.
//! 4. Record collision/trigger pairs with the event bus.
//! 5. Solve position constraints sequentially.
//! 6. Derive velocities from position deltas, in parallel.
//! 7. Solve velocity (restitution) constraints sequentially.
//! 8. Update sleep state in parallel.
//!
//! After all substeps, active pairs reconcile into enter/stay/exit events,
//! sleep transitions reconcile, and buffered events flush to their
//! listeners — all at frame granularity, not per substep, so a contact
//! present throughout the step emits one Enter and the rest Stay rather
//! than churning per substep.

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::body::{BodyType, Material, RigidBody, Transform};
use crate::collision::broad_phase::SpatialGrid;
use crate::collision::{narrow_phase_pair, NarrowPhaseContact};
use crate::dynamics::solver::ContactConstraint;
use crate::error::{PhysicsError, PhysicsResult};
use crate::events::{Event, EventBus, EventKind};
use crate::math::*;
use crate::shape::Shape;

/// An opaque, generation-checked reference to a body in a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl BodyHandle {
    /// Constructs a handle from a raw slot index with generation 0. Used
    /// only to synthesize a handle for event reporting when the original
    /// generation is no longer tracked (a pair-exit event for a body whose
    /// slot may since have been reused) — never for a lookup that must
    /// succeed.
    pub fn from_index(index: u32) -> Self {
        Self { index, generation: 0 }
    }
}

struct SlotMeta {
    generation: u32,
    /// Position in the dense `bodies` array, or `None` if this slot is
    /// currently free.
    dense_index: Option<u32>,
}

/// Description of a body to insert, per spec.md §6's `construct` operation.
pub struct BodyDesc {
    pub transform: Transform,
    pub shape: Shape,
    pub body_type: BodyType,
    pub material: Material,
    pub user_data: u64,
    pub is_trigger: bool,
}

impl BodyDesc {
    pub fn new(transform: Transform, shape: Shape, body_type: BodyType, material: Material) -> Self {
        Self {
            transform,
            shape,
            body_type,
            material,
            user_data: 0,
            is_trigger: false,
        }
    }
}

/// World-level tunables, mirroring the configuration-resource pattern used
/// throughout the engine this crate is modeled on (SPEC_FULL.md §4.11).
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vector,
    pub substeps: u32,
    pub workers: usize,
    pub cell_size: Scalar,
    pub bucket_count: usize,
    pub sleep_time_threshold_substeps: Scalar,
    pub sleep_velocity_threshold: Scalar,
}

impl PhysicsConfig {
    pub fn validate(&self) -> PhysicsResult<()> {
        if self.cell_size <= 0.0 {
            return Err(PhysicsError::InvalidCellSize(self.cell_size));
        }
        if self.bucket_count == 0 {
            return Err(PhysicsError::InvalidBucketCount);
        }
        if self.substeps == 0 {
            return Err(PhysicsError::InvalidSubstepCount);
        }
        Ok(())
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vector::new(0.0, -9.81, 0.0),
            substeps: 4,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cell_size: 2.0,
            bucket_count: 1024,
            sleep_time_threshold_substeps: 10.0,
            sleep_velocity_threshold: 1e-2,
        }
    }
}

/// The simulation world: owns every body, the spatial grid, and the event
/// bus, and advances them all via [`World::step`].
pub struct World {
    config: PhysicsConfig,
    bodies: Vec<RigidBody>,
    /// `body_slot[dense_index]` is the slot index owning that dense
    /// position, so events can reconstruct a [`BodyHandle`] for any body
    /// addressed by its position in `bodies`.
    body_slot: Vec<u32>,
    slot_meta: Vec<SlotMeta>,
    free_list: Vec<u32>,
    grid: SpatialGrid,
    events: EventBus,
    pool: rayon::ThreadPool,
}

impl World {
    pub fn new(config: PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .build()
            .expect("failed to build the physics worker pool");
        Ok(Self {
            grid: SpatialGrid::new(config.cell_size, config.bucket_count),
            config,
            bodies: Vec::new(),
            body_slot: Vec::new(),
            slot_meta: Vec::new(),
            free_list: Vec::new(),
            events: EventBus::new(),
            pool,
        })
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Inserts a new body, returning a handle valid until it is removed.
    pub fn insert_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let mut body = RigidBody::new(desc.transform, desc.shape, desc.body_type, desc.material, desc.user_data);
        body.is_trigger = desc.is_trigger;

        let dense_index = self.bodies.len() as u32;

        let slot_index = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slot_meta[index as usize];
            slot.generation += 1;
            slot.dense_index = Some(dense_index);
            index
        } else {
            let index = self.slot_meta.len() as u32;
            self.slot_meta.push(SlotMeta {
                generation: 0,
                dense_index: Some(dense_index),
            });
            index
        };

        self.bodies.push(body);
        self.body_slot.push(slot_index);

        BodyHandle {
            index: slot_index,
            generation: self.slot_meta[slot_index as usize].generation,
        }
    }

    /// Removes a body, returning its final state. Fails if the handle is
    /// stale (already removed, or from a slot that's been reused).
    pub fn remove_body(&mut self, handle: BodyHandle) -> PhysicsResult<RigidBody> {
        let dense_index = self.checked_dense_index(handle)?;
        self.slot_meta[handle.index as usize].dense_index = None;

        let body = self.bodies.swap_remove(dense_index as usize);
        self.body_slot.swap_remove(dense_index as usize);

        if (dense_index as usize) < self.bodies.len() {
            let moved_slot = self.body_slot[dense_index as usize];
            self.slot_meta[moved_slot as usize].dense_index = Some(dense_index);
        }

        self.free_list.push(handle.index);
        Ok(body)
    }

    pub fn get(&self, handle: BodyHandle) -> PhysicsResult<&RigidBody> {
        let dense_index = self.checked_dense_index(handle)?;
        Ok(&self.bodies[dense_index as usize])
    }

    pub fn get_mut(&mut self, handle: BodyHandle) -> PhysicsResult<&mut RigidBody> {
        let dense_index = self.checked_dense_index(handle)?;
        Ok(&mut self.bodies[dense_index as usize])
    }

    fn checked_dense_index(&self, handle: BodyHandle) -> PhysicsResult<u32> {
        let slot = self
            .slot_meta
            .get(handle.index as usize)
            .ok_or(PhysicsError::UnknownBody)?;
        if slot.generation != handle.generation {
            return Err(PhysicsError::UnknownBody);
        }
        slot.dense_index.ok_or(PhysicsError::UnknownBody)
    }

    fn handle_for_dense(&self, dense_index: u32) -> BodyHandle {
        let slot_index = self.body_slot[dense_index as usize];
        BodyHandle {
            index: slot_index,
            generation: self.slot_meta[slot_index as usize].generation,
        }
    }

    pub fn apply_force(&mut self, handle: BodyHandle, force: Vector) -> PhysicsResult<()> {
        self.get_mut(handle)?.apply_force(force);
        Ok(())
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: Vector) -> PhysicsResult<()> {
        self.get_mut(handle)?.apply_torque(torque);
        Ok(())
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: impl Fn(Event) + Send + Sync + 'static) {
        self.events.subscribe(kind, listener);
    }

    /// Advances the simulation by `dt` seconds, split into the configured
    /// number of substeps, per spec.md §4.9.
    pub fn step(&mut self, dt: Scalar) -> PhysicsResult<()> {
        let h = dt / self.config.substeps as Scalar;
        let gravity = self.config.gravity;
        let workers = self.config.workers;
        let sleep_time_threshold = self.config.sleep_time_threshold_substeps * h;
        let sleep_velocity_threshold = self.config.sleep_velocity_threshold;

        for substep in 0..self.config.substeps {
            trace!(substep, h, "substep begin");

            let pool = &self.pool;
            let bodies = &mut self.bodies;
            pool.install(|| {
                bodies.par_iter_mut().for_each(|body| {
                    body.integrate(h, gravity);
                });
            });

            self.grid.rebuild(&self.bodies);
            let pool = &self.pool;
            let grid = &self.grid;
            let bodies = &self.bodies;
            let pairs = pool.install(|| grid.find_pairs(bodies, workers));
            debug!(pairs = pairs.len(), "broad phase candidate pairs");

            let pool = &self.pool;
            let bodies = &self.bodies;
            let contacts: Vec<NarrowPhaseContact> = pool.install(|| {
                pairs
                    .par_iter()
                    .filter_map(|pair| {
                        let a = &bodies[pair.a as usize];
                        let b = &bodies[pair.b as usize];
                        narrow_phase_pair(pair.a, pair.b, a, b)
                    })
                    .collect()
            });
            trace!(contacts = contacts.len(), "narrow phase contacts");

            for contact in &contacts {
                let is_trigger =
                    self.bodies[contact.a as usize].is_trigger || self.bodies[contact.b as usize].is_trigger;
                let handle_a = self.handle_for_dense(contact.a);
                let handle_b = self.handle_for_dense(contact.b);
                self.events.record_contact(handle_a, handle_b, is_trigger);
            }

            let constraints: Vec<ContactConstraint> = contacts
                .into_iter()
                .filter(|c| !(self.bodies[c.a as usize].is_trigger || self.bodies[c.b as usize].is_trigger))
                .map(|c| {
                    let restitution_a = self.bodies[c.a as usize].material.restitution;
                    let restitution_b = self.bodies[c.b as usize].material.restitution;
                    ContactConstraint::new(
                        c.a,
                        c.b,
                        c.normal,
                        c.manifold.into_iter().collect(),
                        restitution_a,
                        restitution_b,
                    )
                })
                .collect();

            for constraint in &constraints {
                let (a, b) = self.body_pair_mut(constraint.body_a, constraint.body_b);
                constraint.solve_position(a, b);
            }

            let pool = &self.pool;
            let bodies = &mut self.bodies;
            pool.install(|| {
                bodies.par_iter_mut().for_each(|body| {
                    body.update(h);
                });
            });

            for constraint in &constraints {
                let (a, b) = self.body_pair_mut(constraint.body_a, constraint.body_b);
                constraint.solve_velocity(a, b);
            }

            let pool = &self.pool;
            let bodies = &mut self.bodies;
            pool.install(|| {
                bodies.par_iter_mut().for_each(|body| {
                    body.try_sleep(h, sleep_time_threshold, sleep_velocity_threshold);
                });
            });
        }

        // Reconciled once per frame, not per substep: a contact recorded in
        // any substep stays in `current_active_pairs` for the whole step
        // (spec.md §4.9/§4.10 — enter/stay/exit reflect the frame boundary).
        let is_sleeping: Vec<bool> = self.bodies.iter().map(|b| b.is_sleeping()).collect();
        let slot_dense: Vec<Option<u32>> = self.slot_meta.iter().map(|s| s.dense_index).collect();
        self.events.reconcile_pairs(move |slot_index| {
            slot_dense
                .get(slot_index as usize)
                .copied()
                .flatten()
                .map(|d| is_sleeping[d as usize])
                .unwrap_or(true)
        });

        let sleep_snapshot: Vec<(BodyHandle, bool)> = (0..self.bodies.len() as u32)
            .map(|i| (self.handle_for_dense(i), self.bodies[i as usize].is_sleeping()))
            .collect();
        self.events.process_sleep_events(sleep_snapshot.into_iter());
        self.events.flush();

        Ok(())
    }

    /// Two independent mutable borrows into the dense body array for the
    /// solver's per-contact position/velocity passes.
    fn body_pair_mut(&mut self, a: u32, b: u32) -> (&mut RigidBody, &mut RigidBody) {
        assert_ne!(a, b, "a contact constraint never references the same body twice");
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (left, right) = self.bodies.split_at_mut(hi as usize);
        if a < b {
            (&mut left[lo as usize], &mut right[0])
        } else {
            (&mut right[0], &mut left[lo as usize])
        }
    }
}
