//! Scene world: hierarchy, volumes and spatial index behind one context
//!
//! ## Frame flow
//!
//! ```text
//! setters ──> SceneHierarchy (dirty subtree) ──> DirtyScheduler (queued entities)
//!                                                        │ tick(), budgeted
//!                                                        v
//!                        world matrix ──> world volume ──> SpatialIndex::update
//! ```
//!
//! Queries run against the index and the last synced world volumes. An
//! entity still waiting in the queue answers with its previous bounds; the
//! first query of a frame that sees such entities logs a warning.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{Config, IndexKind, SpatialConfig};
use crate::ecs::{Entity, EntityAllocator};
use crate::foundation::collections::NodeHandle;
use crate::foundation::logging::{debug, warn};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::physics::collision::{BoundingVolume, PickMesh, Ray, RayHit, AABB, OBB};
use crate::spatial::{DirtyScheduler, LinearIndex, Octree, OctreeStats, SpatialIndex};

use super::error::SceneError;
use super::frustum::Frustum;
use super::hierarchy::{AttachmentRule, SceneHierarchy};

/// Whether a registered entity made it into the spatial index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Indexed and visible to queries
    Indexed,
    /// Outside the index bounds; invisible to queries until it moves back
    /// or the bounds grow
    Unindexed,
}

/// Per-tick summary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frame counter, starting at 1 for the first tick
    pub frame: u64,
    /// Time step passed to the tick
    pub delta_time: f32,
    /// Entities re-indexed this tick
    pub processed: usize,
    /// Entities left queued for later ticks
    pub deferred: usize,
    /// Registered entities currently outside the index
    pub unindexed: usize,
}

/// Spatial capability attached to an entity
#[derive(Debug, Clone)]
struct SpatialComponent {
    /// Model-space volume, never mutated
    local: BoundingVolume,
    /// World-space volume as of the last sync
    world: BoundingVolume,
    /// Inverse world matrix as of the last sync; carries rays into the pick mesh
    world_inverse: Mat4,
    pick_mesh: Option<PickMesh>,
    status: IndexStatus,
}

/// Scene context owning the transform hierarchy and the spatial index
pub struct SceneWorld {
    config: SpatialConfig,
    entities: EntityAllocator,
    hierarchy: SceneHierarchy,
    nodes: HashMap<Entity, NodeHandle>,
    components: HashMap<Entity, SpatialComponent>,
    index: Box<dyn SpatialIndex>,
    scheduler: DirtyScheduler,
    stale_warned: Cell<bool>,
    frame: u64,
}

impl std::fmt::Debug for SceneWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneWorld")
            .field("frame", &self.frame)
            .field("entities", &self.nodes.len())
            .field("components", &self.components.len())
            .field("indexed", &self.index.entity_count())
            .field("pending", &self.scheduler.pending_count())
            .finish_non_exhaustive()
    }
}

impl Default for SceneWorld {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}

impl SceneWorld {
    /// Create an empty world
    pub fn new(mut config: SpatialConfig) -> Self {
        config.validate();

        let index: Box<dyn SpatialIndex> = match config.index {
            IndexKind::Octree => Box::new(Octree::new(config.world_bounds, config.octree.clone())),
            IndexKind::Linear => Box::new(LinearIndex::new()),
        };

        Self {
            hierarchy: SceneHierarchy::new(config.min_scale),
            config,
            entities: EntityAllocator::new(),
            nodes: HashMap::new(),
            components: HashMap::new(),
            index,
            scheduler: DirtyScheduler::new(),
            stale_warned: Cell::new(false),
            frame: 0,
        }
    }

    /// Create an empty world from a TOML or RON config file
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        Ok(Self::new(SpatialConfig::load_from_file(path)?))
    }

    /// Active configuration
    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Read access to the transform hierarchy
    pub fn hierarchy(&self) -> &SceneHierarchy {
        &self.hierarchy
    }

    /// Read access to the spatial index
    pub fn index(&self) -> &dyn SpatialIndex {
        self.index.as_ref()
    }

    /// Octree statistics, when the world is octree-backed
    pub fn octree_stats(&self) -> Option<OctreeStats> {
        self.index.as_any().downcast_ref::<Octree>().map(Octree::stats)
    }

    /// Frames ticked so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- Lifecycle -------------------------------------------------------

    /// Create an entity with a transform node, optionally under `parent`
    pub fn spawn(&mut self, transform: Transform, parent: Option<Entity>) -> Result<Entity, SceneError> {
        let parent_node = parent.map(|p| self.node_of(p)).transpose()?;

        let entity = self.entities.create_entity();
        let node = self.hierarchy.create_node(transform, Some(entity));
        self.nodes.insert(entity, node);

        if let Some(parent_node) = parent_node {
            self.hierarchy
                .set_parent_attachment(node, Some(parent_node), AttachmentRule::KeepRelative)?;
        }

        self.flush_dirty();
        Ok(entity)
    }

    /// Remove an entity; its children move to its parent, keeping their
    /// world transforms
    pub fn despawn(&mut self, entity: Entity) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;

        if self.components.contains_key(&entity) {
            self.unregister_component(entity)?;
        }
        self.hierarchy.destroy_node(node)?;
        self.nodes.remove(&entity);

        self.flush_dirty();
        Ok(())
    }

    /// Transform node of `entity`
    pub fn node(&self, entity: Entity) -> Option<NodeHandle> {
        self.nodes.get(&entity).copied()
    }

    fn node_of(&self, entity: Entity) -> Result<NodeHandle, SceneError> {
        self.node(entity).ok_or(SceneError::UnknownEntity(entity))
    }

    /// Attach `volume` (model space) and index the entity
    ///
    /// An entity whose world bounds miss the index is kept registered but
    /// reported as [`IndexStatus::Unindexed`].
    pub fn register_component(&mut self, entity: Entity, volume: BoundingVolume) -> Result<IndexStatus, SceneError> {
        let node = self.node_of(entity)?;
        if self.components.contains_key(&entity) {
            return Err(SceneError::AlreadyRegistered(entity));
        }

        let world_matrix = self.hierarchy.world_matrix(node).ok_or(SceneError::InvalidNode(node))?;
        let world = volume.transformed(&world_matrix);
        let world_inverse = self.hierarchy.world_matrix_inverse(node).ok_or(SceneError::InvalidNode(node))?;
        let status = if self.index.insert(entity, world.to_aabb()) {
            IndexStatus::Indexed
        } else {
            IndexStatus::Unindexed
        };

        self.scheduler.remove(entity);
        self.components.insert(entity, SpatialComponent { local: volume, world, world_inverse, pick_mesh: None, status });
        Ok(status)
    }

    /// Detach the volume and drop the entity from the index
    ///
    /// Returns the model-space volume.
    pub fn unregister_component(&mut self, entity: Entity) -> Result<BoundingVolume, SceneError> {
        let component = self.components.remove(&entity).ok_or(SceneError::NotRegistered(entity))?;
        self.index.remove(entity);
        self.scheduler.remove(entity);
        Ok(component.local)
    }

    /// Attach or clear a model-space pick mesh used to refine ray hits
    pub fn set_pick_mesh(&mut self, entity: Entity, mesh: Option<PickMesh>) -> Result<(), SceneError> {
        let component = self.components.get_mut(&entity).ok_or(SceneError::NotRegistered(entity))?;
        component.pick_mesh = mesh;
        Ok(())
    }

    /// Whether `entity` has a volume registered
    pub fn is_registered(&self, entity: Entity) -> bool {
        self.components.contains_key(&entity)
    }

    /// Index status of a registered entity
    pub fn index_status(&self, entity: Entity) -> Option<IndexStatus> {
        self.components.get(&entity).map(|c| c.status)
    }

    // ---- Transforms ------------------------------------------------------

    /// Set the location relative to the parent
    pub fn set_relative_location(&mut self, entity: Entity, location: Vec3) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;
        self.hierarchy.set_relative_location(node, location)?;
        self.flush_dirty();
        Ok(())
    }

    /// Set the rotation relative to the parent
    pub fn set_relative_rotation(&mut self, entity: Entity, rotation: Quat) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;
        self.hierarchy.set_relative_rotation(node, rotation)?;
        self.flush_dirty();
        Ok(())
    }

    /// Set the scale relative to the parent
    pub fn set_relative_scale(&mut self, entity: Entity, scale: Vec3) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;
        self.hierarchy.set_relative_scale(node, scale)?;
        self.flush_dirty();
        Ok(())
    }

    /// Set the full relative transform
    pub fn set_relative_transform(&mut self, entity: Entity, transform: Transform) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;
        self.hierarchy.set_relative_transform(node, transform)?;
        self.flush_dirty();
        Ok(())
    }

    /// Move so the world location is `location`
    pub fn set_world_location(&mut self, entity: Entity, location: Vec3) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;
        self.hierarchy.set_world_location(node, location)?;
        self.flush_dirty();
        Ok(())
    }

    /// Rotate so the world rotation is `rotation`
    pub fn set_world_rotation(&mut self, entity: Entity, rotation: Quat) -> Result<(), SceneError> {
        let node = self.node_of(entity)?;
        self.hierarchy.set_world_rotation(node, rotation)?;
        self.flush_dirty();
        Ok(())
    }

    /// Reparent `child` under `parent`, or detach it with `None`
    pub fn attach(&mut self, child: Entity, parent: Option<Entity>, rule: AttachmentRule) -> Result<(), SceneError> {
        let child_node = self.node_of(child)?;
        let parent_node = parent.map(|p| self.node_of(p)).transpose()?;
        self.hierarchy.set_parent_attachment(child_node, parent_node, rule)?;
        self.flush_dirty();
        Ok(())
    }

    /// Relative transform of `entity`
    pub fn relative_transform(&self, entity: Entity) -> Option<Transform> {
        let node = self.node(entity)?;
        self.hierarchy.node(node).map(|n| n.relative_transform())
    }

    /// Current world matrix of `entity`
    pub fn world_matrix(&self, entity: Entity) -> Option<Mat4> {
        self.hierarchy.world_matrix(self.node(entity)?)
    }

    /// Current world location of `entity`
    pub fn world_location(&self, entity: Entity) -> Option<Vec3> {
        self.hierarchy.world_location(self.node(entity)?)
    }

    /// Parent entity of `entity`
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        let node = self.hierarchy.node(self.node(entity)?)?;
        self.hierarchy.node(node.parent()?)?.owner()
    }

    /// Child entities of `entity`, in attachment order
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.node(entity)
            .and_then(|node| self.hierarchy.node(node))
            .map(|node| {
                node.children()
                    .iter()
                    .filter_map(|child| self.hierarchy.node(*child)?.owner())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Queue every registered entity whose node went dirty
    fn flush_dirty(&mut self) {
        for handle in self.hierarchy.drain_dirty_nodes() {
            let Some(owner) = self.hierarchy.node(handle).and_then(|n| n.owner()) else {
                continue;
            };
            if self.components.contains_key(&owner) {
                self.scheduler.mark_dirty(owner);
            }
        }
    }

    // ---- Frame update ----------------------------------------------------

    /// Re-index up to the configured budget of moved entities
    pub fn tick(&mut self, delta_time: f32) -> FrameStats {
        self.frame += 1;
        self.stale_warned.set(false);
        self.flush_dirty();

        let Self { hierarchy, nodes, components, index, scheduler, config, .. } = self;
        let processed = scheduler.update(delta_time, config.update_budget, |entity| {
            sync_entity(hierarchy, nodes, components, index.as_mut(), entity);
        });

        let stats = FrameStats {
            frame: self.frame,
            delta_time,
            processed,
            deferred: self.scheduler.pending_count(),
            unindexed: self
                .components
                .values()
                .filter(|c| c.status == IndexStatus::Unindexed)
                .count(),
        };

        if stats.processed > 0 || stats.deferred > 0 {
            debug!(
                "Frame {}: re-indexed {}, deferred {}, unindexed {}",
                stats.frame, stats.processed, stats.deferred, stats.unindexed
            );
        }
        stats
    }

    /// Entities waiting for a re-index
    pub fn pending_updates(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Whether `entity` is waiting for a re-index
    pub fn is_pending(&self, entity: Entity) -> bool {
        self.scheduler.is_pending(entity)
    }

    /// Enlarge the index to cover `bounds` and retry unindexed entities
    ///
    /// Returns the entities that are still outside the index.
    pub fn grow_bounds(&mut self, bounds: AABB) -> Vec<Entity> {
        let Some(current) = self.index.world_bounds() else {
            return Vec::new();
        };

        let dropped = self.index.rebuild(current.union(&bounds));
        for entity in dropped {
            if let Some(component) = self.components.get_mut(&entity) {
                component.status = IndexStatus::Unindexed;
            }
        }

        let mut still_outside = Vec::new();
        for (entity, component) in &mut self.components {
            if component.status == IndexStatus::Unindexed {
                if self.index.insert(*entity, component.world.to_aabb()) {
                    component.status = IndexStatus::Indexed;
                } else {
                    still_outside.push(*entity);
                }
            }
        }
        still_outside.sort();
        still_outside
    }

    // ---- Queries ---------------------------------------------------------

    fn note_stale_query(&self, query: &str) {
        let pending = self.scheduler.pending_count();
        if pending > 0 && !self.stale_warned.replace(true) {
            warn!(
                "{} ran with {} entities awaiting re-index; their last synced bounds were used",
                query, pending
            );
        }
    }

    /// Entities whose bounds are not fully outside `frustum`
    pub fn frustum_query(&self, frustum: &Frustum) -> Vec<Entity> {
        self.note_stale_query("Frustum query");
        self.index.frustum_query(frustum)
    }

    /// Closest entity hit by `ray`
    ///
    /// Hits are tested against the entity's world volume and then, if it has
    /// one, its pick mesh. Both use the transform of the last sync, so a
    /// pending move never splits the two tests across different poses.
    pub fn raycast_closest(&self, ray: &Ray) -> Option<RayHit> {
        self.note_stale_query("Raycast");

        let mut narrow = |entity: Entity, _: &AABB| -> Option<f32> {
            let component = self.components.get(&entity)?;
            let distance = component.world.raycast(ray)?;
            match component.pick_mesh {
                Some(ref mesh) => mesh.intersect_world_ray(ray, &component.world_inverse).map(|hit| hit.t),
                None => Some(distance),
            }
        };

        self.index
            .ray_query_closest_by(ray, &mut narrow)
            .map(|(entity, distance)| RayHit { entity, distance, point: ray.point_at(distance) })
    }

    /// Every entity whose bounds `ray` enters, nearest first
    pub fn raycast_candidates(&self, ray: &Ray) -> Vec<Entity> {
        self.note_stale_query("Raycast");
        self.index.ray_query_candidates(ray)
    }

    /// Broad-phase candidates intersecting `bounds`
    pub fn query_aabb(&self, bounds: &AABB) -> Vec<Entity> {
        self.note_stale_query("AABB query");
        self.index.query_aabb(bounds)
    }

    /// Broad-phase candidates intersecting the oriented box `query`
    pub fn query_obb(&self, query: &OBB) -> Vec<Entity> {
        self.note_stale_query("OBB query");
        self.index.query_obb(query)
    }

    /// Entities whose bounds come within `radius` of `center`
    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<Entity> {
        self.note_stale_query("Sphere query");
        self.index.query_sphere(center, radius)
    }

    /// Up to `max_count` entities nearest to `point`
    pub fn find_nearest(&self, point: Vec3, max_count: usize) -> Vec<Entity> {
        self.note_stale_query("Nearest query");
        self.index.find_nearest(point, max_count)
    }

    /// Entities whose world volume intersects `entity`'s, by narrow phase
    pub fn overlapping(&self, entity: Entity) -> Result<Vec<Entity>, SceneError> {
        let volume = self.components.get(&entity).ok_or(SceneError::NotRegistered(entity))?.world;
        self.note_stale_query("Overlap query");

        let mut hits: Vec<Entity> = self
            .index
            .query_aabb(&volume.to_aabb())
            .into_iter()
            .filter(|other| *other != entity)
            .filter(|other| {
                self.components
                    .get(other)
                    .is_some_and(|component| component.world.intersects(&volume))
            })
            .collect();
        hits.sort();
        Ok(hits)
    }

    /// World volume from the entity's current transform
    pub fn world_volume(&self, entity: Entity) -> Option<BoundingVolume> {
        let component = self.components.get(&entity)?;
        let world = self.world_matrix(entity)?;
        Some(component.local.transformed(&world))
    }

    /// World volume as of the last sync, the one queries use
    pub fn synced_volume(&self, entity: Entity) -> Option<BoundingVolume> {
        self.components.get(&entity).map(|c| c.world)
    }
}

/// Refresh one entity's world volume and index entry
fn sync_entity(
    hierarchy: &SceneHierarchy,
    nodes: &HashMap<Entity, NodeHandle>,
    components: &mut HashMap<Entity, SpatialComponent>,
    index: &mut dyn SpatialIndex,
    entity: Entity,
) {
    let (Some(node), Some(component)) = (nodes.get(&entity), components.get_mut(&entity)) else {
        return;
    };
    let (Some(world_matrix), Some(world_inverse)) = (hierarchy.world_matrix(*node), hierarchy.world_matrix_inverse(*node)) else {
        return;
    };

    let local = component.local;
    component.world.update(&local, &world_matrix);
    component.world_inverse = world_inverse;
    component.status = if index.update(entity, component.world.to_aabb()) {
        IndexStatus::Indexed
    } else {
        IndexStatus::Unindexed
    };
}
