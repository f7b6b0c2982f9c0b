//! Scene management system
//!
//! Owns the transform hierarchy and keeps every entity's world-space bounds
//! in a spatial index so the rest of the engine can cull, pick and test
//! overlaps without walking the whole scene.
//!
//! ## Architecture
//!
//! ```text
//! SceneHierarchy (relative transforms, cached world matrices)
//!      ↓
//! DirtyScheduler (moved entities, drained per tick)
//!      ↓
//! SpatialIndex (octree or linear list of world AABBs)
//! ```
//!
//! [`SceneWorld`] ties the three together and is the entry point for
//! gameplay code.

mod error;
mod frustum;
mod hierarchy;
mod world;

#[cfg(test)]
mod tests;

pub use error::SceneError;
pub use frustum::{Containment, Frustum, Plane};
pub use hierarchy::{AttachmentRule, SceneHierarchy, TransformNode};
pub use world::{FrameStats, IndexStatus, SceneWorld};
