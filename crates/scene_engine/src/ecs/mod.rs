//! Entity identifiers
//!
//! The scene core does not own an ECS; it only needs stable opaque IDs to
//! attach its capabilities to.

pub mod entity;

pub use entity::{Entity, EntityAllocator};
