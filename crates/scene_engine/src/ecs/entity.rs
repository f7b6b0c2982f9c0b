//! Entity implementation
//!
//! Entities are opaque identifiers. Capabilities (a transform node, a
//! bounding volume, a pick mesh) are attached to them by the scene world.

use std::fmt;

/// Entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: u32,
}

impl Entity {
    /// Wrap a raw identifier handed out by an external framework
    pub const fn from_raw(id: u32) -> Self {
        Self { id }
    }

    /// Get the entity ID
    pub const fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.id)
    }
}

/// Hands out entity identifiers; identifiers are never reused
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next_entity_id: u32,
}

impl EntityAllocator {
    /// Create a new allocator starting at ID 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity
    pub fn create_entity(&mut self) -> Entity {
        let entity = Entity::from_raw(self.next_entity_id);
        self.next_entity_id += 1;
        entity
    }

    /// Number of entities handed out so far
    pub const fn allocated(&self) -> u32 {
        self.next_entity_id
    }
}
