//! Octree Demo
//!
//! Headless run of the scene world:
//! - Ships with mixed bounding volumes bounce around inside the octree bounds
//! - A carrier drags a chain of escorts through the parent/child hierarchy
//! - Each frame culls against a camera frustum, picks along the view ray
//!   and counts overlaps, logging what the index reports
//!
//! Usage: `octree_demo [config.toml|config.ron] [frames]`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scene_engine::foundation::logging;
use scene_engine::foundation::math::{constants::HALF_PI, utils::normalize_or, Unit};
use scene_engine::prelude::*;

// Octree bounds: -50 to +50 on each axis
const OCTREE_SIZE: f32 = 100.0;

// Entity counts
const NUM_SMALL_SHIPS: usize = 40;
const NUM_LARGE_SHIPS: usize = 8;
const NUM_ESCORTS: usize = 4;

// Movement speeds
const SMALL_SHIP_SPEED: f32 = 6.0;
const LARGE_SHIP_SPEED: f32 = 3.0;
const CARRIER_SPEED: f32 = 2.0;
const SMALL_SHIP_SIZE: f32 = 0.8;
const LARGE_SHIP_SIZE: f32 = 2.0;

const DEFAULT_FRAMES: u64 = 600;
const FRAME_TIME: f32 = 1.0 / 60.0;
const REPORT_INTERVAL: u64 = 60;

struct Ship {
    entity: Entity,
    velocity: Vec3,
}

struct OctreeDemoApp {
    world: SceneWorld,
    ships: Vec<Ship>,
    carrier: Option<Ship>,
    escorts: Vec<Entity>,
    rng: StdRng,
    camera_position: Vec3,
    camera_yaw: f32,
    total_picks: usize,
}

impl OctreeDemoApp {
    fn new(config: SpatialConfig) -> Self {
        Self {
            world: SceneWorld::new(config),
            ships: Vec::new(),
            carrier: None,
            escorts: Vec::new(),
            rng: StdRng::seed_from_u64(0x5eed),
            camera_position: Vec3::new(0.0, 20.0, -80.0),
            camera_yaw: 0.0,
            total_picks: 0,
        }
    }

    fn initialize(&mut self) -> Result<(), SceneError> {
        for i in 0..NUM_SMALL_SHIPS {
            // Alternate volume shapes so every narrow-phase pairing gets exercised
            let volume: BoundingVolume = match i % 3 {
                0 => BoundingSphere::new(Vec3::zeros(), SMALL_SHIP_SIZE).into(),
                1 => AABB::from_center_extents(Vec3::zeros(), Vec3::new(SMALL_SHIP_SIZE, SMALL_SHIP_SIZE * 0.5, SMALL_SHIP_SIZE * 1.5)).into(),
                _ => Capsule::new(Vec3::zeros(), Quat::from_axis_angle(&Vec3::x_axis(), HALF_PI), SMALL_SHIP_SIZE * 0.5, SMALL_SHIP_SIZE).into(),
            };
            self.spawn_ship(volume, SMALL_SHIP_SPEED)?;
        }

        for _ in 0..NUM_LARGE_SHIPS {
            let hull = AABB::from_center_extents(Vec3::zeros(), Vec3::new(LARGE_SHIP_SIZE, LARGE_SHIP_SIZE * 0.6, LARGE_SHIP_SIZE * 2.0));
            let entity = self.spawn_ship(OBB::from_aabb(&hull).into(), LARGE_SHIP_SPEED)?;
            self.world.set_pick_mesh(entity, Some(Self::hull_pick_mesh(&hull)))?;
        }

        self.spawn_carrier_group()?;

        log::info!(
            "Spawned {} ships, a carrier and {} escorts",
            self.ships.len(),
            self.escorts.len()
        );
        Ok(())
    }

    fn random_position(&mut self, margin: f32) -> Vec3 {
        let half = OCTREE_SIZE / 2.0 - margin;
        Vec3::new(
            self.rng.gen_range(-half..half),
            self.rng.gen_range(-half..half),
            self.rng.gen_range(-half..half),
        )
    }

    fn random_velocity(&mut self, speed: f32) -> Vec3 {
        let direction = Vec3::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
        );
        normalize_or(direction, Vec3::z()) * speed
    }

    fn spawn_ship(&mut self, volume: BoundingVolume, speed: f32) -> Result<Entity, SceneError> {
        let position = self.random_position(LARGE_SHIP_SIZE * 2.0);
        let velocity = self.random_velocity(speed);
        let transform = Transform::from_position_rotation(position, Self::rotation_from_velocity(velocity));

        let entity = self.world.spawn(transform, None)?;
        if self.world.register_component(entity, volume)? == IndexStatus::Unindexed {
            log::warn!("{} spawned outside the octree", entity);
        }
        self.ships.push(Ship { entity, velocity });
        Ok(entity)
    }

    /// Carrier with a line of escorts, each parented to the one in front
    fn spawn_carrier_group(&mut self) -> Result<(), SceneError> {
        let velocity = Vec3::new(CARRIER_SPEED, 0.0, 0.0);
        let carrier = self.world.spawn(Transform::from_position(Vec3::new(-30.0, 0.0, 0.0)), None)?;
        self.world
            .register_component(carrier, AABB::from_center_extents(Vec3::zeros(), Vec3::new(4.0, 1.5, 2.0)).into())?;

        let mut leader = carrier;
        for _ in 0..NUM_ESCORTS {
            let escort = self
                .world
                .spawn(Transform::from_position(Vec3::new(-3.0, 0.0, 3.0)), Some(leader))?;
            self.world
                .register_component(escort, BoundingSphere::new(Vec3::zeros(), SMALL_SHIP_SIZE).into())?;
            self.escorts.push(escort);
            leader = escort;
        }

        self.carrier = Some(Ship { entity: carrier, velocity });
        Ok(())
    }

    /// Two-triangle deck across the top of a hull box
    fn hull_pick_mesh(hull: &AABB) -> PickMesh {
        let (min, max) = (hull.min, hull.max);
        let vertices = [
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];
        PickMesh::from_vertices(&vertices, &[0, 1, 2, 0, 2, 3])
    }

    fn rotation_from_velocity(velocity: Vec3) -> Quat {
        if velocity.magnitude() < 0.001 {
            return Quat::identity();
        }

        let forward = velocity.normalize();
        let default_forward = Vec3::new(0.0, 0.0, 1.0);

        let axis = default_forward.cross(&forward);
        if axis.magnitude() < 0.001 {
            // Parallel or anti-parallel
            return if default_forward.dot(&forward) < 0.0 {
                Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::PI)
            } else {
                Quat::identity()
            };
        }

        let angle = default_forward.dot(&forward).clamp(-1.0, 1.0).acos();
        Quat::from_axis_angle(&Unit::new_normalize(axis), angle)
    }

    fn update(&mut self, delta_time: f32) -> Result<FrameStats, SceneError> {
        let half_bounds = OCTREE_SIZE / 2.0 - LARGE_SHIP_SIZE * 2.0;

        for ship in &mut self.ships {
            let Some(mut pos) = self.world.world_location(ship.entity) else {
                continue;
            };
            pos += ship.velocity * delta_time;

            // Bounce off walls
            for axis in 0..3 {
                if pos[axis] < -half_bounds || pos[axis] > half_bounds {
                    ship.velocity[axis] = -ship.velocity[axis];
                    pos[axis] = pos[axis].clamp(-half_bounds, half_bounds);
                }
            }

            self.world.set_relative_location(ship.entity, pos)?;
            self.world
                .set_relative_rotation(ship.entity, Self::rotation_from_velocity(ship.velocity))?;
        }

        if let Some(ref mut carrier) = self.carrier {
            if let Some(mut pos) = self.world.world_location(carrier.entity) {
                pos += carrier.velocity * delta_time;
                if pos.x.abs() > 30.0 {
                    carrier.velocity.x = -carrier.velocity.x;
                }
                self.world.set_relative_location(carrier.entity, pos)?;
                self.world
                    .set_relative_rotation(carrier.entity, Self::rotation_from_velocity(carrier.velocity))?;
            }
        }

        // Slow camera pan
        self.camera_yaw += 0.2 * delta_time;

        Ok(self.world.tick(delta_time))
    }

    fn camera_forward(&self) -> Vec3 {
        Vec3::new(self.camera_yaw.sin() * 0.3, -0.2, self.camera_yaw.cos()).normalize()
    }

    fn report(&mut self, stats: &FrameStats) -> Result<(), SceneError> {
        let forward = self.camera_forward();
        let projection = Mat4::perspective(HALF_PI * 0.8, 16.0 / 9.0, 0.1, 200.0);
        let view = Mat4::look_at(self.camera_position, self.camera_position + forward, Vec3::y());
        let frustum = Frustum::from_view_projection(&(projection * view));

        let visible = self.world.frustum_query(&frustum);
        let picked = self.world.raycast_closest(&Ray::new(self.camera_position, forward));
        if picked.is_some() {
            self.total_picks += 1;
        }

        let mut overlapping_pairs = 0;
        for ship in &self.ships {
            overlapping_pairs += self
                .world
                .overlapping(ship.entity)?
                .iter()
                .filter(|other| **other > ship.entity)
                .count();
        }

        let nearest_to_carrier = match self.carrier {
            Some(ref carrier) => self
                .world
                .world_location(carrier.entity)
                .map(|location| self.world.find_nearest(location, 3))
                .unwrap_or_default(),
            None => Vec::new(),
        };

        log::info!(
            "Frame {}: {} visible, picked {}, {} overlapping pairs, re-indexed {} (deferred {}), carrier neighbours {:?}",
            stats.frame,
            visible.len(),
            picked.map_or_else(|| "nothing".to_string(), |hit| format!("{} at {:.1}", hit.entity, hit.distance)),
            overlapping_pairs,
            stats.processed,
            stats.deferred,
            nearest_to_carrier
        );

        if let Some(octree) = self.world.octree_stats() {
            log::debug!(
                "Octree: {} nodes, {} leaves, {} entries, depth {}, {} splits, {} merges",
                octree.node_count,
                octree.leaf_count,
                octree.entry_count,
                octree.max_occupied_depth,
                octree.subdivisions,
                octree.merges
            );
        }
        Ok(())
    }

    fn run(mut self, frames: u64) -> Result<(), SceneError> {
        self.initialize()?;

        for _ in 0..frames {
            let stats = self.update(FRAME_TIME)?;
            if stats.frame % REPORT_INTERVAL == 0 {
                self.report(&stats)?;
            }
        }

        log::info!(
            "Finished {} frames, the view ray hit something in {} reports",
            self.world.frame(),
            self.total_picks
        );
        if let Some(octree) = self.world.index().as_any().downcast_ref::<Octree>() {
            octree.debug_dump();
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => {
            log::info!("Loading spatial config from {}", path);
            SpatialConfig::load_from_file(&path)?
        }
        None => SpatialConfig::default(),
    };
    let frames = match args.next() {
        Some(frames) => frames.parse()?,
        None => DEFAULT_FRAMES,
    };

    // The demo field is small; keep the octree tight around it
    let half = OCTREE_SIZE / 2.0;
    config.world_bounds = AABB::new(Vec3::new(-half, -half, -half), Vec3::new(half, half, half));

    println!("=== Octree Demo ===");
    println!("Ships bounce inside a {OCTREE_SIZE}-unit cube while the octree follows them.");
    println!("Set RUST_LOG=debug for per-frame octree statistics.");
    println!();

    let app = OctreeDemoApp::new(config);
    app.run(frames)?;
    Ok(())
}
