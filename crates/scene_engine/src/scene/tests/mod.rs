//! Scene-level property tests
//!
//! Exercise the hierarchy, the octree and the scene world together on
//! seeded random scenes.

mod hierarchy_properties;
