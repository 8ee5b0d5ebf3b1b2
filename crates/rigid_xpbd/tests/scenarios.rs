//! End-to-end scenarios exercising [`World`] through its public API only.

use rigid_xpbd::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn config(gravity: Vector, substeps: u32) -> PhysicsConfig {
    PhysicsConfig {
        gravity,
        substeps,
        ..PhysicsConfig::default()
    }
}

#[test]
fn overlapping_spheres_separate_after_one_step() {
    let mut world = World::new(config(Vector::ZERO, 1)).unwrap();

    let a = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.0, 0.0, 0.0), Rotation::IDENTITY),
        Shape::sphere(1.0),
        BodyType::Dynamic,
        Material::new(1.0, 0.0),
    ));
    let b = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(1.5, 0.0, 0.0), Rotation::IDENTITY),
        Shape::sphere(1.0),
        BodyType::Dynamic,
        Material::new(1.0, 0.0),
    ));

    world.step(1.0 / 60.0).unwrap();

    let pa = world.get(a).unwrap().transform.position;
    let pb = world.get(b).unwrap().transform.position;
    assert!((pb - pa).length() >= 2.0 - 1e-3);
}

#[test]
fn box_resting_on_plane_settles_near_rest_height() {
    let mut world = World::new(config(Vector::new(0.0, -9.81, 0.0), 4)).unwrap();

    world.insert_body(BodyDesc::new(
        Transform::identity(),
        Shape::plane(Vector::Y, 0.0),
        BodyType::Static,
        Material::new(1.0, 0.3),
    ));
    let boxy = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.0, 0.9, 0.0), Rotation::IDENTITY),
        Shape::cuboid(1.0, 1.0, 1.0),
        BodyType::Dynamic,
        Material::new(700.0, 0.3),
    ));

    world.step(1.0 / 60.0).unwrap();

    let y = world.get(boxy).unwrap().transform.position.y;
    assert!((y - 1.0).abs() < 5e-2, "box settled at y={y}");
}

#[test]
fn dropped_sphere_bounces_to_roughly_restitution_scaled_height() {
    let radius = 0.5;
    let drop_height = 10.0;
    let restitution = 0.85;

    let mut world = World::new(config(Vector::new(0.0, -9.81, 0.0), 4)).unwrap();
    world.insert_body(BodyDesc::new(
        Transform::identity(),
        Shape::plane(Vector::Y, 0.0),
        BodyType::Static,
        Material::new(1.0, restitution),
    ));
    let sphere = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.0, radius + drop_height, 0.0), Rotation::IDENTITY),
        Shape::sphere(radius),
        BodyType::Dynamic,
        Material::new(700.0, restitution),
    ));

    let dt = 1.0 / 60.0;
    let mut prev_vy = 0.0;
    let mut bounced = false;
    let mut tracking_peak = false;
    let mut peak_height = 0.0_f32;

    for _ in 0..601 {
        world.step(dt).unwrap();
        let body = world.get(sphere).unwrap();
        let y = body.transform.position.y;
        let vy = body.linear_velocity.y;

        if !bounced && prev_vy < 0.0 && vy >= 0.0 {
            bounced = true;
            tracking_peak = true;
            peak_height = y;
        } else if tracking_peak {
            if y > peak_height {
                peak_height = y;
            }
            if vy < 0.0 {
                tracking_peak = false;
            }
        }

        prev_vy = vy;
    }

    assert!(bounced, "sphere never bounced off the plane within the step budget");

    let expected = drop_height * restitution * restitution;
    let observed = peak_height - radius;
    assert!(
        (observed - expected).abs() <= 0.1 * expected,
        "observed peak {observed}, expected ~{expected}"
    );
}

#[test]
fn ten_box_stack_stays_stable() {
    let mut world = World::new(config(Vector::new(0.0, -9.81, 0.0), 2)).unwrap();
    world.insert_body(BodyDesc::new(
        Transform::identity(),
        Shape::plane(Vector::Y, 0.0),
        BodyType::Static,
        Material::new(1.0, 0.1),
    ));

    let mut handles = Vec::new();
    for i in 0..10 {
        let y = 1.0 + 2.0 * i as Scalar;
        let handle = world.insert_body(BodyDesc::new(
            Transform::new(Vector::new(0.0, y, 0.0), Rotation::IDENTITY),
            Shape::cuboid(1.0, 1.0, 1.0),
            BodyType::Dynamic,
            Material::new(700.0, 0.1),
        ));
        handles.push((handle, y));
    }

    let dt = 1.0 / 60.0;
    for _ in 0..600 {
        world.step(dt).unwrap();
    }

    let (top_handle, top_initial_y) = *handles.last().unwrap();
    let top_y = world.get(top_handle).unwrap().transform.position.y;
    assert!(
        (top_y - top_initial_y).abs() < 0.1,
        "top box drifted to y={top_y}, started at y={top_initial_y}"
    );
}

#[test]
fn overlapping_static_bodies_emit_no_collision_events() {
    let mut world = World::new(config(Vector::ZERO, 4)).unwrap();

    let enters = Arc::new(AtomicUsize::new(0));
    let e = enters.clone();
    world.subscribe(EventKind::CollisionEnter, move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });

    let a = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.0, 0.0, 0.0), Rotation::IDENTITY),
        Shape::cuboid(1.0, 1.0, 1.0),
        BodyType::Static,
        Material::new(1.0, 0.0),
    ));
    let b = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.5, 0.0, 0.0), Rotation::IDENTITY),
        Shape::cuboid(1.0, 1.0, 1.0),
        BodyType::Static,
        Material::new(1.0, 0.0),
    ));

    let pos_a_before = world.get(a).unwrap().transform.position;
    let pos_b_before = world.get(b).unwrap().transform.position;

    world.step(1.0 / 60.0).unwrap();

    assert_eq!(enters.load(Ordering::SeqCst), 0);
    assert_eq!(world.get(a).unwrap().transform.position, pos_a_before);
    assert_eq!(world.get(b).unwrap().transform.position, pos_b_before);
}

#[test]
fn sustained_contact_reconciles_once_per_frame_not_per_substep() {
    // A box resting in a static plane for an entire step (substeps=4)
    // should emit exactly one CollisionEnter and three CollisionStay, never
    // a spurious exit in between, since reconciliation happens at frame
    // boundary rather than inside the substep loop.
    let mut world = World::new(config(Vector::new(0.0, -9.81, 0.0), 4)).unwrap();

    let enters = Arc::new(AtomicUsize::new(0));
    let stays = Arc::new(AtomicUsize::new(0));
    let exits = Arc::new(AtomicUsize::new(0));
    let e = enters.clone();
    world.subscribe(EventKind::CollisionEnter, move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    let s = stays.clone();
    world.subscribe(EventKind::CollisionStay, move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });
    let x = exits.clone();
    world.subscribe(EventKind::CollisionExit, move |_| {
        x.fetch_add(1, Ordering::SeqCst);
    });

    world.insert_body(BodyDesc::new(
        Transform::identity(),
        Shape::plane(Vector::Y, 0.0),
        BodyType::Static,
        Material::new(1.0, 0.0),
    ));
    world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.0, 0.5, 0.0), Rotation::IDENTITY),
        Shape::cuboid(1.0, 1.0, 1.0),
        BodyType::Dynamic,
        Material::new(700.0, 0.0),
    ));

    world.step(1.0 / 60.0).unwrap();
    assert_eq!(enters.load(Ordering::SeqCst), 1);
    assert_eq!(exits.load(Ordering::SeqCst), 0);

    world.step(1.0 / 60.0).unwrap();
    assert_eq!(enters.load(Ordering::SeqCst), 1);
    assert!(stays.load(Ordering::SeqCst) >= 1);
    assert_eq!(exits.load(Ordering::SeqCst), 0);
}

#[test]
fn trigger_volume_fires_enter_then_exit_without_solving_position() {
    let mut world = World::new(config(Vector::ZERO, 4)).unwrap();

    let enters = Arc::new(AtomicUsize::new(0));
    let exits = Arc::new(AtomicUsize::new(0));
    let e = enters.clone();
    world.subscribe(EventKind::TriggerEnter, move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    let x = exits.clone();
    world.subscribe(EventKind::TriggerExit, move |_| {
        x.fetch_add(1, Ordering::SeqCst);
    });

    let a = world.insert_body(BodyDesc::new(
        Transform::new(Vector::new(0.0, 0.0, 0.0), Rotation::IDENTITY),
        Shape::cuboid(1.0, 1.0, 1.0),
        BodyType::Dynamic,
        Material::new(1.0, 0.0),
    ));
    let mut trigger_desc = BodyDesc::new(
        Transform::new(Vector::new(0.5, 0.0, 0.0), Rotation::IDENTITY),
        Shape::cuboid(1.0, 1.0, 1.0),
        BodyType::Dynamic,
        Material::new(1.0, 0.0),
    );
    trigger_desc.is_trigger = true;
    let b = world.insert_body(trigger_desc);

    let pos_a_before = world.get(a).unwrap().transform.position;

    world.step(1.0 / 60.0).unwrap();
    assert_eq!(enters.load(Ordering::SeqCst), 1);
    assert_eq!(world.get(a).unwrap().transform.position, pos_a_before);

    world.get_mut(b).unwrap().transform.position = Vector::new(100.0, 100.0, 100.0);
    world.step(1.0 / 60.0).unwrap();
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}
