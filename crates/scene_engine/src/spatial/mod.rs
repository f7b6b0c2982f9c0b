//! Spatial partitioning data structures
//!
//! Provides efficient spatial indexing for culling, ray picking and
//! proximity queries in 3D space, plus the budgeted queue that keeps the
//! index in step with moving entities.

mod octree;
mod scheduler;
mod spatial_query;

pub use octree::{Octree, OctreeConfig, OctreeEntry, OctreeNode, OctreeStats};
pub use scheduler::DirtyScheduler;
pub use spatial_query::{LinearIndex, SpatialIndex};
