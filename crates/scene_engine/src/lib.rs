//! # Scene Engine
//!
//! Scene hierarchy and spatial queries for a game engine.
//!
//! ## Features
//!
//! - **Transform Hierarchy**: Parent/child transforms with lazily cached world matrices
//! - **Bounding Volumes**: AABB, OBB, sphere and capsule with exact intersection tests
//! - **Octree Index**: Adaptive subdivision with culling, picking and nearest queries
//! - **Budgeted Updates**: Moved entities are re-indexed a bounded number per frame
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let mut world = SceneWorld::new(SpatialConfig::default());
//!
//!     let ship = world.spawn(Transform::from_position(Vec3::new(0.0, 0.0, 10.0)), None)?;
//!     world.register_component(ship, BoundingSphere::new(Vec3::zeros(), 1.0).into())?;
//!
//!     world.set_relative_location(ship, Vec3::new(0.0, 0.0, 20.0))?;
//!     world.tick(0.016);
//!
//!     let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
//!     if let Some(hit) = world.raycast_closest(&ray) {
//!         println!("picked {} at {:.2}", hit.entity, hit.distance);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod ecs;
pub mod foundation;
pub mod physics;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, IndexKind, SpatialConfig},
        ecs::Entity,
        foundation::math::{Mat4, Mat4Ext, Quat, Transform, Vec3},
        physics::{BoundingSphere, BoundingVolume, Capsule, PickMesh, Ray, RayHit, AABB, OBB},
        scene::{AttachmentRule, FrameStats, Frustum, IndexStatus, SceneError, SceneWorld},
        spatial::{Octree, OctreeConfig, SpatialIndex},
    };
}
