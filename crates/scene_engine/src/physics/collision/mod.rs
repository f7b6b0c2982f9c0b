//! Bounding volumes and narrow-phase intersection tests
//!
//! Volumes are authored in model space and transformed to world space by the
//! scene's update pass; queries only ever read the synced world copies.
//!
//! # Module Organization
//!
//! - [`primitives`] - Rays, spheres, triangles and segment helpers
//! - [`bounds`] - Axis-aligned box, oriented box and capsule
//! - [`volume`] - The tagged [`BoundingVolume`] stored per entity
//! - [`mesh`] - Model-space triangle meshes for precise picking
//! - [`mesh_bvh`] - Triangle hierarchy behind mesh ray tests

pub mod primitives;
pub mod bounds;
pub mod volume;
pub mod mesh;
pub mod mesh_bvh;

// Re-export commonly used types
pub use primitives::{Ray, RayHit, BoundingSphere, Triangle};
pub use bounds::{AABB, OBB, Capsule};
pub use volume::{BoundingVolume, VolumeKind};
pub use mesh::{MeshHit, PickMesh};
pub use mesh_bvh::MeshBvh;
