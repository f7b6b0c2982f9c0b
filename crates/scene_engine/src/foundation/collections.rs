//! Specialized collection types

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle to a transform node stored in the scene hierarchy arena
    ///
    /// Handles stay valid across reparenting and become stale (never dangling)
    /// once the node is destroyed.
    pub struct NodeHandle;
}

/// Arena of values addressed by [`NodeHandle`]
pub type NodeArena<T> = SlotMap<NodeHandle, T>;
