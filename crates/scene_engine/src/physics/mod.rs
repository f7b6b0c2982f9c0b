//! Geometric collision primitives for the scene
//!
//! Provides the bounding volumes and ray tests the spatial index and scene
//! queries are built on. There is no collision response here.

pub mod collision;

pub use collision::{
    BoundingSphere,
    BoundingVolume,
    Capsule,
    MeshBvh,
    MeshHit,
    PickMesh,
    Ray,
    RayHit,
    Triangle,
    VolumeKind,
    AABB,
    OBB,
};
