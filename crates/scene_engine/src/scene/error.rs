//! Scene errors

use crate::config::ConfigError;
use crate::ecs::Entity;
use crate::foundation::collections::NodeHandle;

/// Errors reported by the scene hierarchy and the scene world
///
/// None of these leave the scene half-mutated: the failing call is a no-op.
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// Parenting a node under itself or one of its descendants
    #[error("cannot attach {child:?} under its own descendant {parent:?}")]
    CyclicAttachment {
        /// Node being attached
        child: NodeHandle,
        /// Requested parent
        parent: NodeHandle,
    },

    /// Handle does not refer to a live node
    #[error("invalid node handle: {0:?}")]
    InvalidNode(NodeHandle),

    /// Entity was never spawned or was already despawned
    #[error("unknown entity: {0}")]
    UnknownEntity(Entity),

    /// Entity already has a bounding volume registered
    #[error("{0} is already registered")]
    AlreadyRegistered(Entity),

    /// Entity has no bounding volume registered
    #[error("{0} is not registered")]
    NotRegistered(Entity),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
