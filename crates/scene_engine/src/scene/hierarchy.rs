//! Transform hierarchy with cached world matrices
//!
//! Nodes live in an arena and link to each other by [`NodeHandle`], so
//! reparenting and destruction never leave a dangling reference behind.
//!
//! World matrices are cached per node behind a dirty flag. Mutating a node
//! flags it and its whole subtree eagerly; the matrices themselves are only
//! recomputed lazily, on the next read. Reads take `&self`, the caches use
//! interior mutability.

use std::cell::Cell;

use crate::ecs::Entity;
use crate::foundation::collections::{NodeArena, NodeHandle};
use crate::foundation::logging::{debug, warn};
use crate::foundation::math::{
    constants::MIN_SCALE, translation_of, utils::clamp_scale, Mat4, Point3, Quat, Transform, Vec3,
};

use super::error::SceneError;

/// What to preserve when a node changes parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentRule {
    /// Keep the relative transform; the world transform follows the new parent
    #[default]
    KeepRelative,
    /// Keep the world transform; the relative transform is recomputed
    KeepWorld,
}

/// A node in the transform tree
#[derive(Debug)]
pub struct TransformNode {
    location: Vec3,
    rotation: Quat,
    scale: Vec3,

    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    owner: Option<Entity>,

    world_matrix: Cell<Mat4>,
    world_matrix_inverse: Cell<Mat4>,
    transform_dirty: Cell<bool>,
    inverse_dirty: Cell<bool>,
}

impl TransformNode {
    fn new(transform: Transform, owner: Option<Entity>) -> Self {
        Self {
            location: transform.position,
            rotation: transform.rotation,
            scale: transform.scale,
            parent: None,
            children: Vec::new(),
            owner,
            world_matrix: Cell::new(Mat4::identity()),
            world_matrix_inverse: Cell::new(Mat4::identity()),
            transform_dirty: Cell::new(true),
            inverse_dirty: Cell::new(true),
        }
    }

    /// Location relative to the parent
    pub fn relative_location(&self) -> Vec3 {
        self.location
    }

    /// Rotation relative to the parent
    pub fn relative_rotation(&self) -> Quat {
        self.rotation
    }

    /// Scale relative to the parent
    pub fn relative_scale(&self) -> Vec3 {
        self.scale
    }

    /// Relative transform as a value
    pub fn relative_transform(&self) -> Transform {
        Transform::from_parts(self.location, self.rotation, self.scale)
    }

    /// `Translation * Rotation * Scale` of the relative transform
    pub fn local_matrix(&self) -> Mat4 {
        self.relative_transform().to_matrix()
    }

    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Children in attachment order
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Entity this node belongs to, if any
    pub fn owner(&self) -> Option<Entity> {
        self.owner
    }

    /// Whether the cached world matrix is stale
    pub fn is_transform_dirty(&self) -> bool {
        self.transform_dirty.get()
    }

    /// Whether the cached inverse world matrix is stale
    pub fn is_inverse_dirty(&self) -> bool {
        self.inverse_dirty.get()
    }

    fn mark_dirty(&self) {
        self.transform_dirty.set(true);
        self.inverse_dirty.set(true);
    }
}

/// Arena-backed forest of transform nodes
#[derive(Debug)]
pub struct SceneHierarchy {
    nodes: NodeArena<TransformNode>,
    min_scale: f32,
    /// Nodes that became dirty since the last drain
    newly_dirty: Vec<NodeHandle>,
}

impl Default for SceneHierarchy {
    fn default() -> Self {
        Self::new(MIN_SCALE)
    }
}

impl SceneHierarchy {
    /// Create an empty hierarchy clamping scales to at least `min_scale`
    pub fn new(min_scale: f32) -> Self {
        Self {
            nodes: NodeArena::with_key(),
            min_scale: min_scale.abs().max(f32::EPSILON),
            newly_dirty: Vec::new(),
        }
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the hierarchy has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `handle` refers to a live node
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Borrow a node
    pub fn node(&self, handle: NodeHandle) -> Option<&TransformNode> {
        self.nodes.get(handle)
    }

    fn node_or_err(&self, handle: NodeHandle) -> Result<&TransformNode, SceneError> {
        self.nodes.get(handle).ok_or(SceneError::InvalidNode(handle))
    }

    fn node_mut_or_err(&mut self, handle: NodeHandle) -> Result<&mut TransformNode, SceneError> {
        self.nodes.get_mut(handle).ok_or(SceneError::InvalidNode(handle))
    }

    /// Nodes without a parent
    pub fn roots(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(handle, _)| handle)
    }

    /// Create a root node
    pub fn create_node(&mut self, transform: Transform, owner: Option<Entity>) -> NodeHandle {
        let mut transform = transform;
        transform.scale = self.clamped_scale(transform.scale);
        let handle = self.nodes.insert(TransformNode::new(transform, owner));
        self.newly_dirty.push(handle);
        handle
    }

    /// Destroy a node, handing its children to its former parent
    ///
    /// Children keep their world transform. Returns the removed node.
    pub fn destroy_node(&mut self, handle: NodeHandle) -> Result<TransformNode, SceneError> {
        let node = self.node_or_err(handle)?;
        let former_parent = node.parent;
        let children = node.children.clone();

        for child in children {
            self.set_parent_attachment(child, former_parent, AttachmentRule::KeepWorld)?;
        }

        if let Some(parent) = former_parent {
            self.remove_child(parent, handle);
        }

        self.newly_dirty.retain(|dirty| *dirty != handle);
        self.nodes.remove(handle).ok_or(SceneError::InvalidNode(handle))
    }

    fn clamped_scale(&self, scale: Vec3) -> Vec3 {
        let (clamped, changed) = clamp_scale(scale, self.min_scale);
        if changed {
            debug!("Clamped scale {:?} to {:?}", scale, clamped);
        }
        clamped
    }

    /// Set the location relative to the parent
    pub fn set_relative_location(&mut self, handle: NodeHandle, location: Vec3) -> Result<(), SceneError> {
        self.node_mut_or_err(handle)?.location = location;
        self.mark_subtree_dirty(handle);
        Ok(())
    }

    /// Set the rotation relative to the parent
    pub fn set_relative_rotation(&mut self, handle: NodeHandle, rotation: Quat) -> Result<(), SceneError> {
        self.node_mut_or_err(handle)?.rotation = rotation;
        self.mark_subtree_dirty(handle);
        Ok(())
    }

    /// Set the scale relative to the parent, clamped away from zero
    pub fn set_relative_scale(&mut self, handle: NodeHandle, scale: Vec3) -> Result<(), SceneError> {
        let scale = self.clamped_scale(scale);
        self.node_mut_or_err(handle)?.scale = scale;
        self.mark_subtree_dirty(handle);
        Ok(())
    }

    /// Set all three relative components at once
    pub fn set_relative_transform(&mut self, handle: NodeHandle, transform: Transform) -> Result<(), SceneError> {
        let scale = self.clamped_scale(transform.scale);
        let node = self.node_mut_or_err(handle)?;
        node.location = transform.position;
        node.rotation = transform.rotation;
        node.scale = scale;
        self.mark_subtree_dirty(handle);
        Ok(())
    }

    /// Flag `handle` and all its descendants as dirty
    ///
    /// A dirty node's descendants are always dirty too, so the walk stops
    /// at subtrees that are already flagged; those were reported when they
    /// first became dirty.
    fn mark_subtree_dirty(&mut self, handle: NodeHandle) {
        let mut stack = vec![handle];
        let mut root = true;

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if !root && node.transform_dirty.get() && node.inverse_dirty.get() {
                continue;
            }
            root = false;

            node.mark_dirty();
            self.newly_dirty.push(current);
            stack.extend(node.children.iter().copied());
        }
    }

    /// Take the nodes that became dirty since the last call
    pub fn drain_dirty_nodes(&mut self) -> Vec<NodeHandle> {
        std::mem::take(&mut self.newly_dirty)
    }

    /// World matrix, recomputed through the parent chain if stale
    ///
    /// Walks up to the nearest clean ancestor, then composes back down,
    /// refreshing every cache on the way. Depth of the chain costs heap,
    /// not stack.
    pub fn world_matrix(&self, handle: NodeHandle) -> Option<Mat4> {
        let node = self.nodes.get(handle)?;
        if !node.transform_dirty.get() {
            return Some(node.world_matrix.get());
        }

        let mut stale = vec![node];
        let mut base = Mat4::identity();
        let mut current = node.parent;
        while let Some(parent) = current.and_then(|h| self.nodes.get(h)) {
            if !parent.transform_dirty.get() {
                base = parent.world_matrix.get();
                break;
            }
            stale.push(parent);
            current = parent.parent;
        }

        for node in stale.into_iter().rev() {
            base *= node.local_matrix();
            node.world_matrix.set(base);
            node.transform_dirty.set(false);
        }

        Some(base)
    }

    /// Inverse of the world matrix, cached the same way
    pub fn world_matrix_inverse(&self, handle: NodeHandle) -> Option<Mat4> {
        let world = self.world_matrix(handle)?;
        let node = self.nodes.get(handle)?;

        if node.inverse_dirty.get() {
            // Scale is clamped on assignment, so this only fails on NaN input
            let inverse = world.try_inverse().unwrap_or_else(|| {
                warn!("World matrix of {:?} is not invertible", handle);
                Mat4::identity()
            });
            node.world_matrix_inverse.set(inverse);
            node.inverse_dirty.set(false);
        }

        Some(node.world_matrix_inverse.get())
    }

    fn parent_world_inverse(&self, handle: NodeHandle) -> Result<Mat4, SceneError> {
        match self.node_or_err(handle)?.parent {
            Some(parent) => self.world_matrix_inverse(parent).ok_or(SceneError::InvalidNode(parent)),
            None => Ok(Mat4::identity()),
        }
    }

    /// World transform decomposed into location, rotation and scale
    pub fn world_transform(&self, handle: NodeHandle) -> Option<Transform> {
        self.world_matrix(handle).map(Transform::from_matrix)
    }

    /// World-space location
    pub fn world_location(&self, handle: NodeHandle) -> Option<Vec3> {
        self.world_matrix(handle).map(|world| translation_of(&world))
    }

    /// World-space rotation
    pub fn world_rotation(&self, handle: NodeHandle) -> Option<Quat> {
        self.world_transform(handle).map(|transform| transform.rotation)
    }

    /// World-space scale
    pub fn world_scale(&self, handle: NodeHandle) -> Option<Vec3> {
        self.world_transform(handle).map(|transform| transform.scale)
    }

    /// World-space forward direction (-Z)
    pub fn forward_vector(&self, handle: NodeHandle) -> Option<Vec3> {
        self.world_rotation(handle).map(|rotation| rotation * -Vec3::z())
    }

    /// World-space right direction (+X)
    pub fn right_vector(&self, handle: NodeHandle) -> Option<Vec3> {
        self.world_rotation(handle).map(|rotation| rotation * Vec3::x())
    }

    /// World-space up direction (+Y)
    pub fn up_vector(&self, handle: NodeHandle) -> Option<Vec3> {
        self.world_rotation(handle).map(|rotation| rotation * Vec3::y())
    }

    /// Move the node so its world location is `location`
    pub fn set_world_location(&mut self, handle: NodeHandle, location: Vec3) -> Result<(), SceneError> {
        let parent_inverse = self.parent_world_inverse(handle)?;
        let local = parent_inverse.transform_point(&Point3::from(location)).coords;
        self.set_relative_location(handle, local)
    }

    /// Rotate the node so its world rotation is `rotation`
    pub fn set_world_rotation(&mut self, handle: NodeHandle, rotation: Quat) -> Result<(), SceneError> {
        let parent_rotation = match self.node_or_err(handle)?.parent {
            Some(parent) => self.world_rotation(parent).unwrap_or_else(Quat::identity),
            None => Quat::identity(),
        };
        self.set_relative_rotation(handle, parent_rotation.inverse() * rotation)
    }

    /// Scale the node so its world scale is `scale`
    pub fn set_world_scale(&mut self, handle: NodeHandle, scale: Vec3) -> Result<(), SceneError> {
        let parent_scale = match self.node_or_err(handle)?.parent {
            Some(parent) => self.world_scale(parent).unwrap_or_else(|| Vec3::new(1.0, 1.0, 1.0)),
            None => Vec3::new(1.0, 1.0, 1.0),
        };
        self.set_relative_scale(handle, scale.component_div(&parent_scale))
    }

    /// Place the node so its world transform is `transform`
    pub fn set_world_transform(&mut self, handle: NodeHandle, transform: Transform) -> Result<(), SceneError> {
        let parent_inverse = self.parent_world_inverse(handle)?;
        let local = Transform::from_matrix(parent_inverse * transform.to_matrix());
        self.set_relative_transform(handle, local)
    }

    /// Whether `node` sits somewhere below `ancestor`
    pub fn is_descendant_of(&self, node: NodeHandle, ancestor: NodeHandle) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.nodes.get(handle).and_then(|n| n.parent);
        }
        false
    }

    /// Number of ancestors above `handle`
    pub fn depth(&self, handle: NodeHandle) -> Option<usize> {
        let mut depth = 0;
        let mut current = self.nodes.get(handle)?.parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes.get(parent).and_then(|n| n.parent);
        }
        Some(depth)
    }

    /// Reparent `child` under `parent`, or detach it to a root with `None`
    ///
    /// Attaching a node under itself or one of its descendants is rejected
    /// without touching the tree.
    pub fn set_parent_attachment(
        &mut self,
        child: NodeHandle,
        parent: Option<NodeHandle>,
        rule: AttachmentRule,
    ) -> Result<(), SceneError> {
        let old_parent = self.node_or_err(child)?.parent;

        if let Some(parent) = parent {
            self.node_or_err(parent)?;
            if parent == child || self.is_descendant_of(parent, child) {
                warn!("Rejected cyclic attachment of {:?} under {:?}", child, parent);
                return Err(SceneError::CyclicAttachment { child, parent });
            }
        }

        let preserved_world = match rule {
            AttachmentRule::KeepWorld => self.world_matrix(child),
            AttachmentRule::KeepRelative => None,
        };

        if let Some(old_parent) = old_parent {
            self.remove_child(old_parent, child);
        }
        if let Some(parent) = parent {
            self.add_child(parent, child);
        }
        self.node_mut_or_err(child)?.parent = parent;

        match preserved_world {
            Some(world) => {
                let parent_inverse = self.parent_world_inverse(child)?;
                let local = Transform::from_matrix(parent_inverse * world);
                self.set_relative_transform(child, local)
            }
            None => {
                self.mark_subtree_dirty(child);
                Ok(())
            }
        }
    }

    /// Append `child` to `parent`'s child list
    ///
    /// List bookkeeping only: `child`'s parent link is left alone. Use
    /// [`SceneHierarchy::set_parent_attachment`] to keep both sides consistent.
    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> bool {
        match self.nodes.get_mut(parent) {
            Some(node) if !node.children.contains(&child) => {
                node.children.push(child);
                true
            }
            _ => false,
        }
    }

    /// Drop `child` from `parent`'s child list
    ///
    /// List bookkeeping only, like [`SceneHierarchy::add_child`].
    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> bool {
        let Some(node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let before = node.children.len();
        node.children.retain(|c| *c != child);
        node.children.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn translated(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn test_world_matrix_is_cached_until_mutation() {
        let mut hierarchy = SceneHierarchy::default();
        let node = hierarchy.create_node(translated(1.0, 0.0, 0.0), None);

        assert!(hierarchy.node(node).unwrap().is_transform_dirty());
        let first = hierarchy.world_matrix(node).unwrap();
        assert!(!hierarchy.node(node).unwrap().is_transform_dirty());
        assert_eq!(hierarchy.world_matrix(node).unwrap(), first);

        hierarchy.set_relative_location(node, Vec3::new(2.0, 0.0, 0.0)).unwrap();
        assert!(hierarchy.node(node).unwrap().is_transform_dirty());
        assert_relative_eq!(hierarchy.world_location(node).unwrap(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_child_follows_parent() {
        let mut hierarchy = SceneHierarchy::default();
        let parent = hierarchy.create_node(translated(10.0, 0.0, 0.0), None);
        let child = hierarchy.create_node(translated(0.0, 1.0, 0.0), None);
        hierarchy.set_parent_attachment(child, Some(parent), AttachmentRule::KeepRelative).unwrap();

        assert_relative_eq!(hierarchy.world_location(child).unwrap(), Vec3::new(10.0, 1.0, 0.0));

        hierarchy.set_relative_location(parent, Vec3::new(-5.0, 0.0, 0.0)).unwrap();
        assert!(hierarchy.node(child).unwrap().is_transform_dirty());
        assert_relative_eq!(hierarchy.world_location(child).unwrap(), Vec3::new(-5.0, 1.0, 0.0));
    }

    #[test]
    fn test_cyclic_attachment_is_rejected() {
        let mut hierarchy = SceneHierarchy::default();
        let a = hierarchy.create_node(Transform::identity(), None);
        let b = hierarchy.create_node(Transform::identity(), None);
        hierarchy.set_parent_attachment(b, Some(a), AttachmentRule::KeepRelative).unwrap();

        let result = hierarchy.set_parent_attachment(a, Some(b), AttachmentRule::KeepRelative);
        assert!(matches!(result, Err(SceneError::CyclicAttachment { .. })));
        assert!(hierarchy.set_parent_attachment(a, Some(a), AttachmentRule::KeepRelative).is_err());

        // Untouched
        assert_eq!(hierarchy.node(a).unwrap().parent(), None);
        assert_eq!(hierarchy.node(a).unwrap().children(), &[b]);
    }

    #[test]
    fn test_keep_world_preserves_world_transform() {
        let mut hierarchy = SceneHierarchy::default();
        let parent = hierarchy.create_node(
            Transform::from_position_rotation(
                Vec3::new(3.0, 0.0, 0.0),
                Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
            )
            .with_uniform_scale(2.0),
            None,
        );
        let child = hierarchy.create_node(translated(1.0, 2.0, 3.0), None);
        let before = hierarchy.world_matrix(child).unwrap();

        hierarchy.set_parent_attachment(child, Some(parent), AttachmentRule::KeepWorld).unwrap();
        assert_relative_eq!(hierarchy.world_matrix(child).unwrap(), before, epsilon = 1e-4);

        hierarchy.set_parent_attachment(child, None, AttachmentRule::KeepWorld).unwrap();
        assert_relative_eq!(hierarchy.world_matrix(child).unwrap(), before, epsilon = 1e-4);
        assert!(hierarchy.node(parent).unwrap().children().is_empty());
    }

    #[test]
    fn test_destroy_reparents_children_to_grandparent() {
        let mut hierarchy = SceneHierarchy::default();
        let root = hierarchy.create_node(translated(1.0, 0.0, 0.0), None);
        let middle = hierarchy.create_node(translated(0.0, 5.0, 0.0), None);
        let leaf = hierarchy.create_node(translated(0.0, 0.0, 2.0), None);
        hierarchy.set_parent_attachment(middle, Some(root), AttachmentRule::KeepRelative).unwrap();
        hierarchy.set_parent_attachment(leaf, Some(middle), AttachmentRule::KeepRelative).unwrap();
        let leaf_world = hierarchy.world_location(leaf).unwrap();

        hierarchy.destroy_node(middle).unwrap();

        assert!(!hierarchy.contains(middle));
        assert_eq!(hierarchy.node(leaf).unwrap().parent(), Some(root));
        assert_eq!(hierarchy.node(root).unwrap().children(), &[leaf]);
        assert_relative_eq!(hierarchy.world_location(leaf).unwrap(), leaf_world, epsilon = 1e-5);
        assert!(matches!(hierarchy.destroy_node(middle), Err(SceneError::InvalidNode(_))));
    }

    #[test]
    fn test_zero_scale_is_clamped() {
        let mut hierarchy = SceneHierarchy::default();
        let node = hierarchy.create_node(Transform::identity(), None);
        hierarchy.set_relative_scale(node, Vec3::new(0.0, 1.0, 1.0)).unwrap();

        assert_relative_eq!(hierarchy.node(node).unwrap().relative_scale(), Vec3::new(MIN_SCALE, 1.0, 1.0));
        assert!(hierarchy.world_matrix(node).unwrap().try_inverse().is_some());
    }

    #[test]
    fn test_world_setters_go_through_parent() {
        let mut hierarchy = SceneHierarchy::default();
        let parent = hierarchy.create_node(translated(10.0, 0.0, 0.0).with_uniform_scale(2.0), None);
        let child = hierarchy.create_node(Transform::identity(), None);
        hierarchy.set_parent_attachment(child, Some(parent), AttachmentRule::KeepRelative).unwrap();

        hierarchy.set_world_location(child, Vec3::new(14.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hierarchy.node(child).unwrap().relative_location(), Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);

        hierarchy.set_world_scale(child, Vec3::new(1.0, 1.0, 1.0)).unwrap();
        assert_relative_eq!(hierarchy.node(child).unwrap().relative_scale(), Vec3::new(0.5, 0.5, 0.5), epsilon = 1e-5);

        let rotation = Quat::from_axis_angle(&Vec3::x_axis(), 0.3);
        hierarchy.set_world_rotation(child, rotation).unwrap();
        assert!(hierarchy.world_rotation(child).unwrap().angle_to(&rotation) < 1e-3);
    }

    #[test]
    fn test_world_transform_roundtrip_refreshes_inverse() {
        let mut hierarchy = SceneHierarchy::default();
        let parent = hierarchy.create_node(
            Transform::from_position_rotation(Vec3::new(0.0, 5.0, 0.0), Quat::from_axis_angle(&Vec3::z_axis(), 0.5)),
            None,
        );
        let child = hierarchy.create_node(Transform::identity(), None);
        hierarchy.set_parent_attachment(child, Some(parent), AttachmentRule::KeepRelative).unwrap();
        hierarchy.world_matrix_inverse(child).unwrap();
        assert!(!hierarchy.node(child).unwrap().is_inverse_dirty());

        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), 1.0);
        let target = Transform::from_parts(Vec3::new(1.0, 2.0, 3.0), rotation, Vec3::new(2.0, 2.0, 2.0));
        hierarchy.set_world_transform(child, target).unwrap();
        assert!(hierarchy.node(child).unwrap().is_inverse_dirty());

        let world = hierarchy.world_transform(child).unwrap();
        assert_relative_eq!(world.position, target.position, epsilon = 1e-4);
        assert_relative_eq!(world.scale, target.scale, epsilon = 1e-4);
        assert!(world.rotation.angle_to(&rotation) < 1e-3);

        let expected_relative = Quat::from_axis_angle(&Vec3::z_axis(), -0.5) * rotation;
        assert!(hierarchy.node(child).unwrap().relative_rotation().angle_to(&expected_relative) < 1e-3);

        let inverse = hierarchy.world_matrix_inverse(child).unwrap();
        assert_relative_eq!(hierarchy.world_matrix(child).unwrap() * inverse, Mat4::identity(), epsilon = 1e-4);
    }

    #[test]
    fn test_direction_vectors() {
        let mut hierarchy = SceneHierarchy::default();
        let node = hierarchy.create_node(
            Transform::from_position_rotation(Vec3::zeros(), Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2)),
            None,
        );

        assert_relative_eq!(hierarchy.forward_vector(node).unwrap(), -Vec3::x(), epsilon = 1e-5);
        assert_relative_eq!(hierarchy.right_vector(node).unwrap(), -Vec3::z(), epsilon = 1e-5);
        assert_relative_eq!(hierarchy.up_vector(node).unwrap(), Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_deep_chain_world_matrix() {
        const DEPTH: usize = 10_000;

        let mut hierarchy = SceneHierarchy::default();
        let root = hierarchy.create_node(translated(0.0, 1.0, 0.0), None);
        let mut chain = vec![root];
        for _ in 1..DEPTH {
            let node = hierarchy.create_node(translated(1.0, 0.0, 0.0), None);
            let parent = chain[chain.len() - 1];
            hierarchy.set_parent_attachment(node, Some(parent), AttachmentRule::KeepRelative).unwrap();
            chain.push(node);
        }
        let tip = chain[DEPTH - 1];

        assert_relative_eq!(hierarchy.world_location(tip).unwrap(), Vec3::new((DEPTH - 1) as f32, 1.0, 0.0));
        assert!(chain.iter().all(|n| !hierarchy.node(*n).unwrap().is_transform_dirty()));

        // Dirty only the lower half; the walk stops at the clean midpoint
        let middle = chain[DEPTH / 2];
        hierarchy.set_relative_location(middle, Vec3::new(2.0, 0.0, 0.0)).unwrap();
        assert!(!hierarchy.node(chain[DEPTH / 2 - 1]).unwrap().is_transform_dirty());
        assert_relative_eq!(hierarchy.world_location(tip).unwrap(), Vec3::new(DEPTH as f32, 1.0, 0.0));
        assert!(hierarchy.world_matrix_inverse(tip).is_some());
    }

    #[test]
    fn test_drain_reports_subtree_once() {
        let mut hierarchy = SceneHierarchy::default();
        let parent = hierarchy.create_node(Transform::identity(), None);
        let child = hierarchy.create_node(Transform::identity(), None);
        hierarchy.set_parent_attachment(child, Some(parent), AttachmentRule::KeepRelative).unwrap();
        hierarchy.world_matrix(child);
        hierarchy.drain_dirty_nodes();

        hierarchy.set_relative_location(parent, Vec3::x()).unwrap();
        hierarchy.set_relative_location(parent, Vec3::y()).unwrap();

        let dirty = hierarchy.drain_dirty_nodes();
        assert_eq!(dirty.iter().filter(|h| **h == child).count(), 1);
        assert!(dirty.contains(&parent));
        assert!(hierarchy.drain_dirty_nodes().is_empty());
    }
}
