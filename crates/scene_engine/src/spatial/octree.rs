//! Octree spatial partitioning structure
//!
//! Efficiently divides 3D space into hierarchical regions for fast
//! spatial queries. Each leaf subdivides into 8 octants when entity
//! density exceeds a threshold, and collapses back once its children
//! thin out again.
//!
//! Entities are stored by their world AABB, in leaves only. An entity whose
//! box straddles a split plane is stored in every leaf it touches, so a
//! query never has to look outside the cells its own shape reaches. Query
//! results are de-duplicated before they are returned.
//!
//! An entity whose box reaches past the root bounds is kept in a separate
//! overflow list instead. Every query scans that list too, so a query that
//! only touches the part outside the root still finds it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ecs::Entity;
use crate::foundation::logging::{debug, trace, warn};
use crate::foundation::math::{constants::EPSILON, Vec3};
use crate::physics::collision::{Ray, AABB, OBB};
use crate::scene::{Containment, Frustum};

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Maximum entities per leaf before subdivision
    pub max_entities_per_node: usize,

    /// Maximum subdivision depth
    pub max_depth: u32,

    /// Minimum child cell size (prevents excessive subdivision)
    pub min_node_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_entities_per_node: 16,
            max_depth: 14,
            min_node_size: 0.5,
        }
    }
}

/// Entity reference stored in a leaf
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeEntry {
    /// Indexed entity
    pub entity: Entity,
    /// World AABB the entity was inserted with
    pub bounds: AABB,
}

/// Structural counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    subdivisions: usize,
    merges: usize,
}

/// Snapshot of the tree's shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OctreeStats {
    /// Total nodes, including the root
    pub node_count: usize,
    /// Nodes without children
    pub leaf_count: usize,
    /// Deepest depth holding at least one entry
    pub max_occupied_depth: u32,
    /// Distinct indexed entities
    pub entity_count: usize,
    /// Leaf entries; exceeds `entity_count` when entities straddle cells
    pub entry_count: usize,
    /// Entities reaching past the root bounds, held outside the tree
    pub overflow_count: usize,
    /// Subdivisions since creation or the last clear
    pub subdivisions: usize,
    /// Merges since creation or the last clear
    pub merges: usize,
}

/// Single node in the octree hierarchy
#[derive(Debug, Clone)]
pub struct OctreeNode {
    /// World-space bounds of this node
    pub bounds: AABB,

    /// Entries stored in this node (leaves only)
    pub entries: Vec<OctreeEntry>,

    /// Child nodes (8 octants), None if this is a leaf
    pub children: Option<Box<[OctreeNode; 8]>>,

    /// Depth in the tree (0 = root)
    pub depth: u32,
}

impl OctreeNode {
    /// Create a new leaf node
    pub fn new(bounds: AABB, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            depth,
        }
    }

    /// Check if this node is a leaf (has no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Whether a leaf holding too many entries should split
    ///
    /// Splitting is skipped when it would separate nothing, e.g. when every
    /// entry covers the whole cell. Such a leaf over-fills instead, the same
    /// way a leaf at maximum depth does.
    fn should_subdivide(&self, config: &OctreeConfig) -> bool {
        if self.entries.len() <= config.max_entities_per_node
            || self.depth >= config.max_depth
            || self.bounds.extents().min() < config.min_node_size
        {
            return false;
        }

        (0..8).any(|octant| {
            let child = self.bounds.octant(octant);
            self.entries.iter().filter(|e| e.bounds.intersects(&child)).count() < self.entries.len()
        })
    }

    /// Subdivide this node into 8 children and push its entries down
    fn subdivide(&mut self, config: &OctreeConfig, counters: &mut Counters) {
        if self.children.is_some() {
            return; // Already subdivided
        }

        let depth = self.depth + 1;
        let mut children: Box<[OctreeNode; 8]> =
            Box::new(std::array::from_fn(|octant| OctreeNode::new(self.bounds.octant(octant), depth)));

        for entry in std::mem::take(&mut self.entries) {
            for child in children.iter_mut() {
                if child.bounds.intersects(&entry.bounds) {
                    child.entries.push(entry);
                }
            }
        }

        counters.subdivisions += 1;
        trace!("Subdivided octree node at depth {} ({:?})", self.depth, self.bounds.center());

        for child in children.iter_mut() {
            if child.should_subdivide(config) {
                child.subdivide(config, counters);
            }
        }

        self.children = Some(children);
    }

    /// Insert an entry into every intersecting leaf below this node
    fn insert(&mut self, entry: OctreeEntry, config: &OctreeConfig, counters: &mut Counters) {
        if let Some(ref mut children) = self.children {
            for child in children.iter_mut() {
                if child.bounds.intersects(&entry.bounds) {
                    child.insert(entry, config, counters);
                }
            }
            return;
        }

        self.entries.push(entry);
        if self.should_subdivide(config) {
            self.subdivide(config, counters);
        }
    }

    /// Remove every entry for `entity` in cells that `hint` reaches
    fn remove(&mut self, entity: Entity, hint: &AABB, config: &OctreeConfig, counters: &mut Counters) -> bool {
        if !self.bounds.intersects(hint) {
            return false;
        }

        let Some(ref mut children) = self.children else {
            let before = self.entries.len();
            self.entries.retain(|e| e.entity != entity);
            return self.entries.len() != before;
        };

        let mut removed = false;
        for child in children.iter_mut() {
            removed |= child.remove(entity, hint, config, counters);
        }

        if removed {
            self.try_merge(config, counters);
        }
        removed
    }

    /// Collapse the children into this node when they are all leaves and
    /// together hold fewer distinct entities than a leaf's capacity
    fn try_merge(&mut self, config: &OctreeConfig, counters: &mut Counters) {
        let Some(ref children) = self.children else {
            return;
        };
        if !children.iter().all(OctreeNode::is_leaf) {
            return;
        }

        let mut seen = HashSet::new();
        let merged: Vec<OctreeEntry> = children
            .iter()
            .flat_map(|child| child.entries.iter())
            .filter(|entry| seen.insert(entry.entity))
            .copied()
            .collect();

        if merged.len() >= config.max_entities_per_node {
            return;
        }

        self.entries = merged;
        self.children = None;
        counters.merges += 1;
        trace!("Merged octree node at depth {} ({:?})", self.depth, self.bounds.center());
    }

    fn query_aabb(&self, query: &AABB, seen: &mut HashSet<Entity>, results: &mut Vec<Entity>) {
        if !self.bounds.intersects(query) {
            return;
        }

        match self.children {
            Some(ref children) => {
                for child in children.iter() {
                    child.query_aabb(query, seen, results);
                }
            }
            None => {
                for entry in &self.entries {
                    if entry.bounds.intersects(query) && seen.insert(entry.entity) {
                        results.push(entry.entity);
                    }
                }
            }
        }
    }

    fn query_sphere(&self, center: Vec3, radius_sq: f32, seen: &mut HashSet<Entity>, results: &mut Vec<Entity>) {
        // Quick AABB check - if sphere doesn't intersect node bounds, skip
        if self.bounds.distance_squared_to_point(center) > radius_sq {
            return;
        }

        match self.children {
            Some(ref children) => {
                for child in children.iter() {
                    child.query_sphere(center, radius_sq, seen, results);
                }
            }
            None => {
                for entry in &self.entries {
                    if entry.bounds.distance_squared_to_point(center) <= radius_sq && seen.insert(entry.entity) {
                        results.push(entry.entity);
                    }
                }
            }
        }
    }

    fn query_obb(&self, query: &OBB, reach: &AABB, seen: &mut HashSet<Entity>, results: &mut Vec<Entity>) {
        if !self.bounds.intersects(reach) {
            return;
        }

        match self.children {
            Some(ref children) => {
                for child in children.iter() {
                    child.query_obb(query, reach, seen, results);
                }
            }
            None => {
                for entry in &self.entries {
                    if query.intersects_aabb(&entry.bounds) && seen.insert(entry.entity) {
                        results.push(entry.entity);
                    }
                }
            }
        }
    }

    fn frustum_query(&self, frustum: &Frustum, seen: &mut HashSet<Entity>, results: &mut Vec<Entity>) {
        match frustum.classify_aabb(&self.bounds) {
            Containment::Outside => {}
            Containment::Inside => self.collect_all(seen, results),
            Containment::Intersecting => match self.children {
                Some(ref children) => {
                    for child in children.iter() {
                        child.frustum_query(frustum, seen, results);
                    }
                }
                None => {
                    for entry in &self.entries {
                        if frustum.intersects_aabb(&entry.bounds) && seen.insert(entry.entity) {
                            results.push(entry.entity);
                        }
                    }
                }
            },
        }
    }

    fn collect_all(&self, seen: &mut HashSet<Entity>, results: &mut Vec<Entity>) {
        for entry in &self.entries {
            if seen.insert(entry.entity) {
                results.push(entry.entity);
            }
        }
        if let Some(ref children) = self.children {
            for child in children.iter() {
                child.collect_all(seen, results);
            }
        }
    }

    /// Get all leaf nodes (for visualization)
    pub fn get_all_leaves<'a>(&'a self, leaves: &mut Vec<&'a OctreeNode>) {
        if self.is_leaf() {
            leaves.push(self);
        } else if let Some(ref children) = self.children {
            for child in children.iter() {
                child.get_all_leaves(leaves);
            }
        }
    }

    fn accumulate_stats(&self, stats: &mut OctreeStats) {
        stats.node_count += 1;
        match self.children {
            Some(ref children) => {
                for child in children.iter() {
                    child.accumulate_stats(stats);
                }
            }
            None => {
                stats.leaf_count += 1;
                stats.entry_count += self.entries.len();
                if !self.entries.is_empty() {
                    stats.max_occupied_depth = stats.max_occupied_depth.max(self.depth);
                }
            }
        }
    }

    fn dump(&self) {
        let indent = "  ".repeat(self.depth as usize);
        debug!(
            "{}[depth {}] min={:?} max={:?} entries={}{}",
            indent,
            self.depth,
            self.bounds.min,
            self.bounds.max,
            self.entries.len(),
            if self.is_leaf() { "" } else { " (branch)" },
        );
        if let Some(ref children) = self.children {
            for child in children.iter() {
                child.dump();
            }
        }
    }
}

/// Min-heap item: smallest key first, then smallest rank
struct Queued<T> {
    key: f32,
    rank: u64,
    item: T,
}

impl<T> Queued<T> {
    /// Nodes expand before entities at the same key, so every entity at
    /// that distance is queued before any of them pops
    const NODE_RANK: u64 = 0;

    fn node(key: f32, item: T) -> Self {
        Self { key, rank: Self::NODE_RANK, item }
    }
}

impl Queued<NearestItem<'_>> {
    fn entity(entry: &OctreeEntry, point: Vec3) -> Self {
        Self {
            key: entry.bounds.distance_squared_to_point(point),
            rank: u64::from(entry.entity.id()) + 1,
            item: NearestItem::Entity(entry.entity),
        }
    }
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        other.key.total_cmp(&self.key).then_with(|| other.rank.cmp(&self.rank))
    }
}

enum NearestItem<'a> {
    Node(&'a OctreeNode),
    Entity(Entity),
}

/// Whether a ray distance `t` lies past the current best hit
fn beyond_best(best: Option<(Entity, f32)>, t: f32) -> bool {
    matches!(best, Some((_, d)) if t > d + EPSILON)
}

/// Octree spatial partitioning structure
#[derive(Debug, Clone)]
pub struct Octree {
    /// Root node containing the entire world space
    root: OctreeNode,

    /// Configuration
    config: OctreeConfig,

    /// AABB each entity was last inserted with; steers removal
    last_bounds: HashMap<Entity, AABB>,

    /// Entries not contained by the root bounds
    overflow: Vec<OctreeEntry>,

    counters: Counters,
}

impl Octree {
    /// Create a new octree with given world bounds
    pub fn new(world_bounds: AABB, config: OctreeConfig) -> Self {
        Self {
            root: OctreeNode::new(world_bounds, 0),
            config,
            last_bounds: HashMap::new(),
            overflow: Vec::new(),
            counters: Counters::default(),
        }
    }

    /// Root node
    pub fn root(&self) -> &OctreeNode {
        &self.root
    }

    /// Bounds of the root node
    pub fn bounds(&self) -> AABB {
        self.root.bounds
    }

    /// Configuration in use
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Insert an entity with its world AABB
    ///
    /// Returns `false`, leaving the entity out of the tree, when the box
    /// misses the root bounds entirely. A box that only partly overlaps the
    /// root goes to the overflow list. Re-inserting an indexed entity
    /// replaces its previous entry.
    pub fn insert(&mut self, entity: Entity, bounds: AABB) -> bool {
        if self.last_bounds.contains_key(&entity) {
            self.remove(entity);
        }

        if !self.root.bounds.intersects(&bounds) {
            warn!("{} at {:?}..{:?} lies outside the octree bounds", entity, bounds.min, bounds.max);
            return false;
        }

        let entry = OctreeEntry { entity, bounds };
        if self.root.bounds.contains(&bounds) {
            self.root.insert(entry, &self.config, &mut self.counters);
        } else {
            debug!("{} reaches past the octree bounds, keeping it in overflow", entity);
            self.overflow.push(entry);
        }
        self.last_bounds.insert(entity, bounds);
        true
    }

    /// Remove an entity from the octree
    pub fn remove(&mut self, entity: Entity) -> bool {
        let Some(hint) = self.last_bounds.remove(&entity) else {
            return false;
        };

        if self.root.bounds.contains(&hint) {
            self.root.remove(entity, &hint, &self.config, &mut self.counters)
        } else {
            let before = self.overflow.len();
            self.overflow.retain(|e| e.entity != entity);
            self.overflow.len() != before
        }
    }

    /// Move an entity to a new AABB
    pub fn update(&mut self, entity: Entity, bounds: AABB) -> bool {
        self.remove(entity);
        self.insert(entity, bounds)
    }

    /// Whether `entity` is indexed
    pub fn contains(&self, entity: Entity) -> bool {
        self.last_bounds.contains_key(&entity)
    }

    /// The AABB `entity` is indexed under
    pub fn bounds_of(&self, entity: Entity) -> Option<AABB> {
        self.last_bounds.get(&entity).copied()
    }

    /// Get total entity count
    pub fn entity_count(&self) -> usize {
        self.last_bounds.len()
    }

    /// Clear the octree
    pub fn clear(&mut self) {
        self.root = OctreeNode::new(self.root.bounds, 0);
        self.last_bounds.clear();
        self.overflow.clear();
        self.counters = Counters::default();
    }

    /// Replace the root bounds and re-insert everything
    ///
    /// Returns the entities that no longer fit and were dropped.
    pub fn rebuild(&mut self, world_bounds: AABB) -> Vec<Entity> {
        let mut entries: Vec<(Entity, AABB)> = self.last_bounds.drain().collect();
        entries.sort_by_key(|(entity, _)| *entity);

        self.root = OctreeNode::new(world_bounds, 0);
        self.overflow.clear();
        let mut dropped = Vec::new();
        for (entity, bounds) in entries {
            if !self.insert(entity, bounds) {
                dropped.push(entity);
            }
        }

        debug!(
            "Rebuilt octree with bounds {:?}..{:?}: {} entities, {} dropped",
            world_bounds.min,
            world_bounds.max,
            self.last_bounds.len(),
            dropped.len()
        );
        dropped
    }

    /// Entities whose AABB intersects `query`, each reported once
    pub fn query_aabb(&self, query: &AABB) -> Vec<Entity> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        self.root.query_aabb(query, &mut seen, &mut results);
        self.scan_overflow(|bounds| bounds.intersects(query), &mut seen, &mut results);
        results
    }

    /// Entities whose AABB intersects the oriented box `query`
    ///
    /// Nodes are pruned by the box's enclosing AABB; entries get the exact
    /// separating-axis test.
    pub fn query_obb(&self, query: &OBB) -> Vec<Entity> {
        let reach = query.to_aabb();
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        self.root.query_obb(query, &reach, &mut seen, &mut results);
        self.scan_overflow(|bounds| query.intersects_aabb(bounds), &mut seen, &mut results);
        results
    }

    fn scan_overflow<F>(&self, mut hit: F, seen: &mut HashSet<Entity>, results: &mut Vec<Entity>)
    where
        F: FnMut(&AABB) -> bool,
    {
        for entry in &self.overflow {
            if hit(&entry.bounds) && seen.insert(entry.entity) {
                results.push(entry.entity);
            }
        }
    }

    /// Entities whose AABB comes within `radius` of `center`
    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<Entity> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let radius_sq = radius * radius;
        self.root.query_sphere(center, radius_sq, &mut seen, &mut results);
        self.scan_overflow(|bounds| bounds.distance_squared_to_point(center) <= radius_sq, &mut seen, &mut results);
        results
    }

    /// Entities whose AABB is not fully outside `frustum`
    ///
    /// Subtrees entirely inside the frustum are accepted without testing
    /// their entries.
    pub fn frustum_query(&self, frustum: &Frustum) -> Vec<Entity> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        self.root.frustum_query(frustum, &mut seen, &mut results);
        self.scan_overflow(|bounds| frustum.intersects_aabb(bounds), &mut seen, &mut results);
        results
    }

    /// Up to `max_count` entities closest to `point`, nearest first
    ///
    /// Distance is measured to each entity's AABB. Best-first search:
    /// nodes are expanded in order of their distance to `point`. A tree
    /// entity's closest point lies in one of its leaves, so that leaf's
    /// distance lower-bounds the entity and it is queued before its own
    /// distance comes up. Overflow entities are queued from the start.
    /// Equal distances resolve to the lower entity id.
    pub fn find_nearest(&self, point: Vec3, max_count: usize) -> Vec<Entity> {
        let mut results = Vec::with_capacity(max_count.min(self.entity_count()));
        if max_count == 0 {
            return results;
        }

        let mut queued = HashSet::new();
        let mut heap = BinaryHeap::new();
        heap.push(Queued::node(
            self.root.bounds.distance_squared_to_point(point),
            NearestItem::Node(&self.root),
        ));
        for entry in &self.overflow {
            heap.push(Queued::entity(entry, point));
        }

        while let Some(Queued { item, .. }) = heap.pop() {
            match item {
                NearestItem::Entity(entity) => {
                    results.push(entity);
                    if results.len() == max_count {
                        break;
                    }
                }
                NearestItem::Node(node) => match node.children {
                    Some(ref children) => {
                        for child in children.iter() {
                            heap.push(Queued::node(
                                child.bounds.distance_squared_to_point(point),
                                NearestItem::Node(child),
                            ));
                        }
                    }
                    None => {
                        for entry in &node.entries {
                            if queued.insert(entry.entity) {
                                heap.push(Queued::entity(entry, point));
                            }
                        }
                    }
                },
            }
        }

        results
    }

    /// Closest entity along `ray`, refined by a narrow-phase test
    ///
    /// `narrow` receives each candidate whose AABB the ray enters and returns
    /// the exact hit distance, if any. Its result must never be closer than
    /// the AABB entry distance. Nodes are visited nearest entry first, and
    /// traversal stops once the next node starts beyond the best hit. Equal
    /// distances resolve to the lower entity id.
    pub fn ray_query_closest_by(
        &self,
        ray: &Ray,
        narrow: &mut dyn FnMut(Entity, &AABB) -> Option<f32>,
    ) -> Option<(Entity, f32)> {
        let mut best: Option<(Entity, f32)> = None;
        for entry in &self.overflow {
            Self::offer_ray_candidate(entry, ray, narrow, &mut best);
        }

        let Some(root_t) = self.root.bounds.intersect_ray(ray) else {
            return best;
        };

        let mut tested = HashSet::new();
        let mut heap = BinaryHeap::new();
        heap.push(Queued::node(root_t, &self.root));

        while let Some(Queued { key: node_t, item: node, .. }) = heap.pop() {
            if beyond_best(best, node_t) {
                break;
            }

            match node.children {
                Some(ref children) => {
                    for child in children.iter() {
                        if let Some(t) = child.bounds.intersect_ray(ray) {
                            if !beyond_best(best, t) {
                                heap.push(Queued::node(t, child));
                            }
                        }
                    }
                }
                None => {
                    for entry in &node.entries {
                        if tested.insert(entry.entity) {
                            Self::offer_ray_candidate(entry, ray, narrow, &mut best);
                        }
                    }
                }
            }
        }

        best
    }

    /// Narrow-phase one entry and keep it if it beats `best`
    fn offer_ray_candidate(
        entry: &OctreeEntry,
        ray: &Ray,
        narrow: &mut dyn FnMut(Entity, &AABB) -> Option<f32>,
        best: &mut Option<(Entity, f32)>,
    ) {
        let Some(box_t) = entry.bounds.intersect_ray(ray) else {
            return;
        };
        if beyond_best(*best, box_t) {
            return;
        }
        let Some(distance) = narrow(entry.entity, &entry.bounds) else {
            return;
        };

        let closer = match *best {
            None => true,
            Some((best_entity, best_distance)) => {
                distance.total_cmp(&best_distance).then(entry.entity.cmp(&best_entity)) == Ordering::Less
            }
        };
        if closer {
            *best = Some((entry.entity, distance));
        }
    }

    /// Closest entity whose AABB `ray` enters
    pub fn ray_query_closest(&self, ray: &Ray) -> Option<(Entity, f32)> {
        self.ray_query_closest_by(ray, &mut |_: Entity, bounds: &AABB| bounds.intersect_ray(ray))
    }

    /// Every entity whose AABB `ray` enters, nearest entry first
    pub fn ray_query_candidates(&self, ray: &Ray) -> Vec<Entity> {
        let mut hits: Vec<(f32, Entity)> = self
            .overflow
            .iter()
            .filter_map(|entry| entry.bounds.intersect_ray(ray).map(|t| (t, entry.entity)))
            .collect();
        let mut seen = HashSet::new();
        let mut stack = vec![&self.root];

        while let Some(node) = stack.pop() {
            if node.bounds.intersect_ray(ray).is_none() {
                continue;
            }
            match node.children {
                Some(ref children) => stack.extend(children.iter()),
                None => {
                    for entry in &node.entries {
                        if !seen.insert(entry.entity) {
                            continue;
                        }
                        if let Some(t) = entry.bounds.intersect_ray(ray) {
                            hits.push((t, entry.entity));
                        }
                    }
                }
            }
        }

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Get all leaf nodes (for visualization)
    pub fn get_all_leaves(&self) -> Vec<&OctreeNode> {
        let mut leaves = Vec::new();
        self.root.get_all_leaves(&mut leaves);
        leaves
    }

    /// Shape and activity counters
    pub fn stats(&self) -> OctreeStats {
        let mut stats = OctreeStats {
            entity_count: self.last_bounds.len(),
            overflow_count: self.overflow.len(),
            subdivisions: self.counters.subdivisions,
            merges: self.counters.merges,
            ..OctreeStats::default()
        };
        self.root.accumulate_stats(&mut stats);
        stats
    }

    /// Log the node structure at debug level
    pub fn debug_dump(&self) {
        let stats = self.stats();
        debug!(
            "Octree: {} nodes, {} leaves, {} entities in {} entries, {} in overflow, max occupied depth {}",
            stats.node_count,
            stats.leaf_count,
            stats.entity_count,
            stats.entry_count,
            stats.overflow_count,
            stats.max_occupied_depth
        );
        self.root.dump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityAllocator;
    use crate::foundation::math::Quat;

    fn world_bounds() -> AABB {
        AABB::new(Vec3::new(-100.0, -100.0, -100.0), Vec3::new(100.0, 100.0, 100.0))
    }

    fn point_box(p: Vec3) -> AABB {
        AABB::from_center_extents(p, Vec3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_octree_basic_insertion() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        let mut allocator = EntityAllocator::new();

        let entity = allocator.create_entity();
        assert!(octree.insert(entity, point_box(Vec3::zeros())));
        assert_eq!(octree.entity_count(), 1);
        assert_eq!(octree.bounds_of(entity), Some(point_box(Vec3::zeros())));
    }

    #[test]
    fn test_out_of_bounds_insert_is_reported() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        let entity = Entity::from_raw(7);

        assert!(!octree.insert(entity, point_box(Vec3::new(500.0, 0.0, 0.0))));
        assert!(!octree.contains(entity));
        assert!(octree.query_aabb(&AABB::new(Vec3::new(400.0, -10.0, -10.0), Vec3::new(600.0, 10.0, 10.0))).is_empty());
    }

    #[test]
    fn test_octree_subdivision() {
        let config = OctreeConfig {
            max_entities_per_node: 4,
            max_depth: 3,
            min_node_size: 1.0,
        };
        let mut octree = Octree::new(world_bounds(), config);
        let mut allocator = EntityAllocator::new();

        for i in 0..10 {
            let offset = i as f32 * 10.0 - 45.0;
            octree.insert(allocator.create_entity(), point_box(Vec3::new(offset, offset, offset)));
        }

        assert_eq!(octree.entity_count(), 10);
        assert!(octree.root().children.is_some());
    }

    #[test]
    fn test_identical_boxes_stop_at_max_depth() {
        let config = OctreeConfig {
            max_entities_per_node: 4,
            max_depth: 3,
            min_node_size: 0.001,
        };
        let mut octree = Octree::new(world_bounds(), config);
        let mut allocator = EntityAllocator::new();

        for _ in 0..10 {
            octree.insert(allocator.create_entity(), point_box(Vec3::new(10.0, 10.0, 10.0)));
        }

        let stats = octree.stats();
        assert_eq!(stats.entity_count, 10);
        assert!(stats.max_occupied_depth <= 3);
    }

    #[test]
    fn test_straddling_entity_reported_once() {
        let config = OctreeConfig {
            max_entities_per_node: 1,
            max_depth: 4,
            min_node_size: 1.0,
        };
        let mut octree = Octree::new(world_bounds(), config);
        let big = Entity::from_raw(1);
        octree.insert(big, AABB::from_center_extents(Vec3::zeros(), Vec3::new(5.0, 5.0, 5.0)));
        octree.insert(Entity::from_raw(2), point_box(Vec3::new(50.0, 50.0, 50.0)));

        let stats = octree.stats();
        assert!(stats.entry_count > stats.entity_count);

        let found = octree.query_aabb(&AABB::from_center_extents(Vec3::zeros(), Vec3::new(10.0, 10.0, 10.0)));
        assert_eq!(found, vec![big]);
    }

    #[test]
    fn test_remove_uses_last_bounds() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        let entity = Entity::from_raw(3);
        octree.insert(entity, point_box(Vec3::new(20.0, 0.0, 0.0)));

        assert!(octree.update(entity, point_box(Vec3::new(-20.0, 0.0, 0.0))));
        assert!(octree.query_sphere(Vec3::new(20.0, 0.0, 0.0), 2.0).is_empty());
        assert_eq!(octree.query_sphere(Vec3::new(-20.0, 0.0, 0.0), 2.0), vec![entity]);

        assert!(octree.remove(entity));
        assert!(!octree.remove(entity));
        assert_eq!(octree.stats().entry_count, 0);
    }

    #[test]
    fn test_octree_radius_query() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        let mut allocator = EntityAllocator::new();

        let entity1 = allocator.create_entity();
        let entity2 = allocator.create_entity();
        let entity3 = allocator.create_entity();

        octree.insert(entity1, point_box(Vec3::new(0.0, 0.0, 0.0)));
        octree.insert(entity2, point_box(Vec3::new(5.0, 0.0, 0.0)));
        octree.insert(entity3, point_box(Vec3::new(50.0, 0.0, 0.0)));

        let results = octree.query_sphere(Vec3::new(0.0, 0.0, 0.0), 10.0);
        assert_eq!(results.len(), 2); // Should find entity1 and entity2
    }

    #[test]
    fn test_ray_query_closest_prefers_nearest() {
        let config = OctreeConfig {
            max_entities_per_node: 2,
            ..OctreeConfig::default()
        };
        let mut octree = Octree::new(world_bounds(), config);
        let near = Entity::from_raw(1);
        let far = Entity::from_raw(2);
        let off_axis = Entity::from_raw(3);
        octree.insert(far, point_box(Vec3::new(0.0, 0.0, 60.0)));
        octree.insert(near, point_box(Vec3::new(0.0, 0.0, 20.0)));
        octree.insert(off_axis, point_box(Vec3::new(30.0, 0.0, 10.0)));

        let ray = Ray::new(Vec3::new(0.0, 0.0, -50.0), Vec3::new(0.0, 0.0, 1.0));
        let (entity, distance) = octree.ray_query_closest(&ray).unwrap();

        assert_eq!(entity, near);
        assert!((distance - 69.5).abs() < 1e-3);
        assert_eq!(octree.ray_query_candidates(&ray), vec![near, far]);
    }

    #[test]
    fn test_ray_query_narrow_phase_can_reject() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        let near = Entity::from_raw(1);
        let far = Entity::from_raw(2);
        octree.insert(near, point_box(Vec3::new(0.0, 0.0, 10.0)));
        octree.insert(far, point_box(Vec3::new(0.0, 0.0, 30.0)));

        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
        let hit = octree.ray_query_closest_by(&ray, &mut |entity: Entity, bounds: &AABB| {
            if entity == near { None } else { bounds.intersect_ray(&ray) }
        });

        assert_eq!(hit.map(|(e, _)| e), Some(far));
    }

    #[test]
    fn test_find_nearest_orders_by_distance() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig { max_entities_per_node: 2, ..OctreeConfig::default() });
        for (id, x) in [(1, 40.0), (2, -10.0), (3, 5.0), (4, 80.0)] {
            octree.insert(Entity::from_raw(id), point_box(Vec3::new(x, 0.0, 0.0)));
        }

        let nearest = octree.find_nearest(Vec3::zeros(), 3);
        assert_eq!(nearest, vec![Entity::from_raw(3), Entity::from_raw(2), Entity::from_raw(1)]);
        assert!(octree.find_nearest(Vec3::zeros(), 0).is_empty());
        assert_eq!(octree.find_nearest(Vec3::zeros(), 10).len(), 4);
    }

    #[test]
    fn test_entity_reaching_past_root_stays_queryable() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig { max_entities_per_node: 1, ..OctreeConfig::default() });
        let long = Entity::from_raw(1);
        let long_box = AABB::new(Vec3::new(90.0, -5.0, -5.0), Vec3::new(190.0, 5.0, 5.0));
        assert!(octree.insert(long, long_box));
        octree.insert(Entity::from_raw(2), point_box(Vec3::new(-40.0, 0.0, 0.0)));
        octree.insert(Entity::from_raw(3), point_box(Vec3::new(40.0, 40.0, 0.0)));

        assert_eq!(octree.stats().overflow_count, 1);
        assert_eq!(octree.bounds_of(long), Some(long_box));

        // Only the part beyond the root is touched
        let outside = AABB::new(Vec3::new(150.0, -1.0, -1.0), Vec3::new(160.0, 1.0, 1.0));
        assert_eq!(octree.query_aabb(&outside), vec![long]);
        assert_eq!(octree.query_sphere(Vec3::new(170.0, 0.0, 0.0), 1.0), vec![long]);

        let ray = Ray::new(Vec3::new(150.0, 0.0, -50.0), Vec3::z());
        let (entity, distance) = octree.ray_query_closest(&ray).unwrap();
        assert_eq!(entity, long);
        assert!((distance - 45.0).abs() < 1e-4);
        assert_eq!(octree.ray_query_candidates(&ray), vec![long]);

        assert!(octree.remove(long));
        assert!(octree.query_aabb(&outside).is_empty());
        assert_eq!(octree.stats().overflow_count, 0);
    }

    #[test]
    fn test_find_nearest_from_outside_root() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig { max_entities_per_node: 1, ..OctreeConfig::default() });
        let small = Entity::from_raw(2);
        let wide = Entity::from_raw(5);
        octree.insert(small, point_box(Vec3::new(99.0, 0.0, 0.0)));
        octree.insert(Entity::from_raw(3), point_box(Vec3::new(-60.0, 0.0, 0.0)));
        octree.insert(wide, AABB::new(Vec3::new(50.0, 90.0, -5.0), Vec3::new(190.0, 100.0, 5.0)));

        // The wide box's nearest point (190, 90, 0) beats the small box at x = 99.5
        let point = Vec3::new(200.0, 0.0, 0.0);
        assert_eq!(octree.find_nearest(point, 2), vec![wide, small]);
    }

    #[test]
    fn test_find_nearest_unbounded_count() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        for id in 1..=5 {
            octree.insert(Entity::from_raw(id), point_box(Vec3::new(id as f32 * 10.0, 0.0, 0.0)));
        }

        let all = octree.find_nearest(Vec3::zeros(), usize::MAX);
        assert_eq!(all, (1..=5).map(Entity::from_raw).collect::<Vec<_>>());
    }

    #[test]
    fn test_obb_query_uses_orientation() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig { max_entities_per_node: 2, ..OctreeConfig::default() });
        let on_diagonal = Entity::from_raw(1);
        let in_corner = Entity::from_raw(2);
        octree.insert(on_diagonal, point_box(Vec3::new(8.0, 8.0, 0.0)));
        octree.insert(in_corner, point_box(Vec3::new(12.0, -12.0, 0.0)));

        // Thin slab along the XY diagonal; its enclosing AABB covers both boxes
        let slab = OBB::new(
            Vec3::zeros(),
            Vec3::new(20.0, 1.0, 1.0),
            *Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_4).to_rotation_matrix().matrix(),
        );
        assert_eq!(octree.query_aabb(&slab.to_aabb()).len(), 2);
        assert_eq!(octree.query_obb(&slab), vec![on_diagonal]);
    }

    #[test]
    fn test_rebuild_drops_entities_outside_new_bounds() {
        let mut octree = Octree::new(world_bounds(), OctreeConfig::default());
        octree.insert(Entity::from_raw(1), point_box(Vec3::new(10.0, 0.0, 0.0)));
        octree.insert(Entity::from_raw(2), point_box(Vec3::new(90.0, 0.0, 0.0)));

        let dropped = octree.rebuild(AABB::new(Vec3::new(-50.0, -50.0, -50.0), Vec3::new(50.0, 50.0, 50.0)));

        assert_eq!(dropped, vec![Entity::from_raw(2)]);
        assert_eq!(octree.entity_count(), 1);
    }
}
