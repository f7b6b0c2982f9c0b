//! Abstract spatial index interface
//!
//! The scene world talks to its index through [`SpatialIndex`], so the
//! octree can be swapped for the exhaustive [`LinearIndex`] (small scenes,
//! validation runs) without touching anything else.

use std::any::Any;
use std::collections::HashMap;

use crate::ecs::Entity;
use crate::foundation::math::Vec3;
use crate::physics::collision::{Ray, AABB, OBB};
use crate::scene::Frustum;
use crate::spatial::Octree;

/// Abstract interface for spatial indexing of entity AABBs
///
/// All queries report each entity at most once.
pub trait SpatialIndex: Send + Sync {
    /// Index an entity under `bounds`, replacing any previous entry
    ///
    /// Returns `false` when the index cannot hold the entity.
    fn insert(&mut self, entity: Entity, bounds: AABB) -> bool;

    /// Remove an entity, returning whether it was indexed
    fn remove(&mut self, entity: Entity) -> bool;

    /// Re-index an entity under new bounds
    fn update(&mut self, entity: Entity, bounds: AABB) -> bool {
        self.remove(entity);
        self.insert(entity, bounds)
    }

    /// Whether `entity` is indexed
    fn contains(&self, entity: Entity) -> bool;

    /// The AABB `entity` is indexed under
    fn bounds_of(&self, entity: Entity) -> Option<AABB>;

    /// Entities whose AABB intersects `query`
    fn query_aabb(&self, query: &AABB) -> Vec<Entity>;

    /// Entities whose AABB comes within `radius` of `center`
    fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<Entity>;

    /// Entities whose AABB is not fully outside `frustum`
    fn frustum_query(&self, frustum: &Frustum) -> Vec<Entity>;

    /// Entities whose AABB intersects the oriented box `query`
    fn query_obb(&self, query: &OBB) -> Vec<Entity>;

    /// Up to `max_count` entities nearest to `point`, nearest first
    fn find_nearest(&self, point: Vec3, max_count: usize) -> Vec<Entity>;

    /// Closest entity along `ray` as judged by `narrow`
    fn ray_query_closest_by(
        &self,
        ray: &Ray,
        narrow: &mut dyn FnMut(Entity, &AABB) -> Option<f32>,
    ) -> Option<(Entity, f32)>;

    /// Every entity whose AABB `ray` enters, nearest entry first
    fn ray_query_candidates(&self, ray: &Ray) -> Vec<Entity>;

    /// Region the index covers, `None` when unbounded
    fn world_bounds(&self) -> Option<AABB>;

    /// Change the covered region, returning entities that no longer fit
    fn rebuild(&mut self, bounds: AABB) -> Vec<Entity>;

    /// Clear all entities from the index
    fn clear(&mut self);

    /// Get the number of entities in the index
    fn entity_count(&self) -> usize;

    /// Downcast to Any for type-specific access (e.g., Octree stats)
    fn as_any(&self) -> &dyn Any;
}

impl SpatialIndex for Octree {
    fn insert(&mut self, entity: Entity, bounds: AABB) -> bool {
        Octree::insert(self, entity, bounds)
    }

    fn remove(&mut self, entity: Entity) -> bool {
        Octree::remove(self, entity)
    }

    fn update(&mut self, entity: Entity, bounds: AABB) -> bool {
        Octree::update(self, entity, bounds)
    }

    fn contains(&self, entity: Entity) -> bool {
        Octree::contains(self, entity)
    }

    fn bounds_of(&self, entity: Entity) -> Option<AABB> {
        Octree::bounds_of(self, entity)
    }

    fn query_aabb(&self, query: &AABB) -> Vec<Entity> {
        Octree::query_aabb(self, query)
    }

    fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<Entity> {
        Octree::query_sphere(self, center, radius)
    }

    fn frustum_query(&self, frustum: &Frustum) -> Vec<Entity> {
        Octree::frustum_query(self, frustum)
    }

    fn query_obb(&self, query: &OBB) -> Vec<Entity> {
        Octree::query_obb(self, query)
    }

    fn find_nearest(&self, point: Vec3, max_count: usize) -> Vec<Entity> {
        Octree::find_nearest(self, point, max_count)
    }

    fn ray_query_closest_by(
        &self,
        ray: &Ray,
        narrow: &mut dyn FnMut(Entity, &AABB) -> Option<f32>,
    ) -> Option<(Entity, f32)> {
        Octree::ray_query_closest_by(self, ray, narrow)
    }

    fn ray_query_candidates(&self, ray: &Ray) -> Vec<Entity> {
        Octree::ray_query_candidates(self, ray)
    }

    fn world_bounds(&self) -> Option<AABB> {
        Some(self.bounds())
    }

    fn rebuild(&mut self, bounds: AABB) -> Vec<Entity> {
        Octree::rebuild(self, bounds)
    }

    fn clear(&mut self) {
        Octree::clear(self);
    }

    fn entity_count(&self) -> usize {
        Octree::entity_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Simple list-based index (no spatial optimization)
///
/// Performs a linear scan for every query. Sufficient for small scenes and
/// used as the reference answer when validating the octree.
#[derive(Debug, Default)]
pub struct LinearIndex {
    /// Entities with their bounding boxes, in insertion order
    entities: Vec<(Entity, AABB)>,
    /// Position of each entity in `entities`
    slots: HashMap<Entity, usize>,
}

impl LinearIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_by<F>(&self, mut key: F) -> Vec<Entity>
    where
        F: FnMut(&AABB) -> Option<f32>,
    {
        let mut keyed: Vec<(f32, Entity)> = self
            .entities
            .iter()
            .filter_map(|(entity, bounds)| key(bounds).map(|k| (k, *entity)))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        keyed.into_iter().map(|(_, entity)| entity).collect()
    }
}

impl SpatialIndex for LinearIndex {
    fn insert(&mut self, entity: Entity, bounds: AABB) -> bool {
        if let Some(&slot) = self.slots.get(&entity) {
            self.entities[slot].1 = bounds;
        } else {
            self.slots.insert(entity, self.entities.len());
            self.entities.push((entity, bounds));
        }
        true
    }

    fn remove(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.slots.remove(&entity) else {
            return false;
        };
        self.entities.swap_remove(slot);
        if let Some((moved, _)) = self.entities.get(slot) {
            self.slots.insert(*moved, slot);
        }
        true
    }

    fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    fn bounds_of(&self, entity: Entity) -> Option<AABB> {
        self.slots.get(&entity).map(|&slot| self.entities[slot].1)
    }

    fn query_aabb(&self, query: &AABB) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, bounds)| bounds.intersects(query))
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<Entity> {
        let radius_squared = radius * radius;
        self.entities
            .iter()
            .filter(|(_, bounds)| bounds.distance_squared_to_point(center) <= radius_squared)
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn frustum_query(&self, frustum: &Frustum) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, bounds)| frustum.intersects_aabb(bounds))
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn query_obb(&self, query: &OBB) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, bounds)| query.intersects_aabb(bounds))
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn find_nearest(&self, point: Vec3, max_count: usize) -> Vec<Entity> {
        let mut nearest = self.sorted_by(|bounds| Some(bounds.distance_squared_to_point(point)));
        nearest.truncate(max_count);
        nearest
    }

    fn ray_query_closest_by(
        &self,
        ray: &Ray,
        narrow: &mut dyn FnMut(Entity, &AABB) -> Option<f32>,
    ) -> Option<(Entity, f32)> {
        self.entities
            .iter()
            .filter(|(_, bounds)| bounds.intersect_ray(ray).is_some())
            .filter_map(|(entity, bounds)| narrow(*entity, bounds).map(|t| (*entity, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }

    fn ray_query_candidates(&self, ray: &Ray) -> Vec<Entity> {
        self.sorted_by(|bounds| bounds.intersect_ray(ray))
    }

    fn world_bounds(&self) -> Option<AABB> {
        None
    }

    fn rebuild(&mut self, _bounds: AABB) -> Vec<Entity> {
        Vec::new()
    }

    fn clear(&mut self) {
        self.entities.clear();
        self.slots.clear();
    }

    fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use crate::spatial::OctreeConfig;

    fn indexes() -> Vec<Box<dyn SpatialIndex>> {
        let bounds = AABB::new(Vec3::new(-50.0, -50.0, -50.0), Vec3::new(50.0, 50.0, 50.0));
        let config = OctreeConfig {
            max_entities_per_node: 4,
            max_depth: 5,
            min_node_size: 5.0,
        };
        vec![Box::new(Octree::new(bounds, config)), Box::new(LinearIndex::new())]
    }

    #[test]
    fn test_spatial_index_insert_remove() {
        for mut index in indexes() {
            let entity = Entity::from_raw(1);
            let bounds = AABB::from_center_extents(Vec3::zeros(), Vec3::new(5.0, 5.0, 5.0));

            assert!(index.insert(entity, bounds));
            assert_eq!(index.entity_count(), 1);
            assert_eq!(index.bounds_of(entity), Some(bounds));

            assert!(index.remove(entity));
            assert_eq!(index.entity_count(), 0);
            assert!(!index.contains(entity));
        }
    }

    #[test]
    fn test_linear_remove_keeps_slots_consistent() {
        let mut index = LinearIndex::new();
        for id in 0..4 {
            index.insert(Entity::from_raw(id), AABB::from_center_extents(Vec3::new(id as f32 * 10.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)));
        }

        assert!(index.remove(Entity::from_raw(0)));
        assert_eq!(
            index.bounds_of(Entity::from_raw(3)).map(|b| b.center()),
            Some(Vec3::new(30.0, 0.0, 0.0))
        );
        assert!(index.remove(Entity::from_raw(3)));
        assert_eq!(index.entity_count(), 2);
    }

    #[test]
    fn test_indexes_agree_on_queries() {
        let mut indexes = indexes();
        for index in &mut indexes {
            for id in 0..20u32 {
                let x = (id as f32 * 7.3) % 80.0 - 40.0;
                let y = (id as f32 * 3.1) % 60.0 - 30.0;
                index.insert(Entity::from_raw(id), AABB::from_center_extents(Vec3::new(x, y, 0.0), Vec3::new(1.0, 1.0, 1.0)));
            }
            // Reaches past the octree root on +X
            index.insert(Entity::from_raw(100), AABB::new(Vec3::new(40.0, -2.0, -1.0), Vec3::new(70.0, 2.0, 1.0)));
        }

        let query = AABB::new(Vec3::new(-10.0, -10.0, -5.0), Vec3::new(20.0, 15.0, 5.0));
        let slab = OBB::new(
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(30.0, 2.0, 2.0),
            *Quat::from_axis_angle(&Vec3::z_axis(), 0.6).to_rotation_matrix().matrix(),
        );
        let ray = Ray::new(Vec3::new(-45.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let mut answers = indexes.iter().map(|index| {
            let mut in_box = index.query_aabb(&query);
            in_box.sort();
            let mut near = index.query_sphere(Vec3::zeros(), 12.0);
            near.sort();
            let mut in_slab = index.query_obb(&slab);
            in_slab.sort();
            (
                in_box,
                near,
                in_slab,
                index.find_nearest(Vec3::new(3.0, 3.0, 0.0), 5),
                index.find_nearest(Vec3::new(90.0, 0.0, 0.0), 3),
                index.ray_query_candidates(&ray),
            )
        });

        let octree = answers.next().unwrap();
        let linear = answers.next().unwrap();
        assert_eq!(octree, linear);
    }
}
