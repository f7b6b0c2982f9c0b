//! Budgeted re-index queue
//!
//! Entities whose transform changed wait here until the next tick pulls
//! them out, a bounded number per frame. Whatever does not fit in the
//! budget stays queued for the following frame; until then queries see
//! the entity's previous, slightly outdated bounds.

use std::collections::{HashSet, VecDeque};

use crate::ecs::Entity;
use crate::foundation::logging::debug;

/// FIFO of entities awaiting a world-bounds refresh
#[derive(Debug, Default)]
pub struct DirtyScheduler {
    queue: VecDeque<Entity>,
    pending: HashSet<Entity>,
}

impl DirtyScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `entity`; an entity already queued keeps its place
    ///
    /// Returns whether the entity was newly queued.
    pub fn mark_dirty(&mut self, entity: Entity) -> bool {
        if !self.pending.insert(entity) {
            return false;
        }
        self.queue.push_back(entity);
        true
    }

    /// Drop `entity` from the queue, e.g. when it leaves the scene
    pub fn remove(&mut self, entity: Entity) -> bool {
        if !self.pending.remove(&entity) {
            return false;
        }
        self.queue.retain(|queued| *queued != entity);
        true
    }

    /// Whether `entity` is waiting for a refresh
    pub fn is_pending(&self, entity: Entity) -> bool {
        self.pending.contains(&entity)
    }

    /// Number of queued entities
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Pop up to `budget` entities in FIFO order and hand each to `refresh`
    ///
    /// Returns how many were processed.
    pub fn update<F>(&mut self, delta_time: f32, budget: usize, mut refresh: F) -> usize
    where
        F: FnMut(Entity),
    {
        let mut processed = 0;
        while processed < budget {
            let Some(entity) = self.queue.pop_front() else {
                break;
            };
            self.pending.remove(&entity);
            refresh(entity);
            processed += 1;
        }

        if !self.queue.is_empty() {
            debug!(
                "Update budget of {} reached after {:.2}ms frame, {} entities deferred",
                budget,
                delta_time * 1000.0,
                self.queue.len()
            );
        }

        processed
    }

    /// Forget everything queued
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_dirty_deduplicates() {
        let mut scheduler = DirtyScheduler::new();
        let entity = Entity::from_raw(1);

        assert!(scheduler.mark_dirty(entity));
        assert!(!scheduler.mark_dirty(entity));
        assert_eq!(scheduler.pending_count(), 1);

        let mut seen = Vec::new();
        scheduler.update(0.016, 10, |e| seen.push(e));
        assert_eq!(seen, vec![entity]);
        assert!(!scheduler.is_pending(entity));
    }

    #[test]
    fn test_budget_defers_the_rest_in_order() {
        let mut scheduler = DirtyScheduler::new();
        for id in 0..5 {
            scheduler.mark_dirty(Entity::from_raw(id));
        }

        let mut seen = Vec::new();
        assert_eq!(scheduler.update(0.016, 3, |e| seen.push(e.id())), 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(scheduler.pending_count(), 2);

        assert_eq!(scheduler.update(0.016, 3, |e| seen.push(e.id())), 2);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(scheduler.update(0.016, 3, |_| {}), 0);
    }

    #[test]
    fn test_remove_drops_queued_entity() {
        let mut scheduler = DirtyScheduler::new();
        scheduler.mark_dirty(Entity::from_raw(1));
        scheduler.mark_dirty(Entity::from_raw(2));

        assert!(scheduler.remove(Entity::from_raw(1)));
        assert!(!scheduler.remove(Entity::from_raw(1)));

        let mut seen = Vec::new();
        scheduler.update(0.016, 10, |e| seen.push(e.id()));
        assert_eq!(seen, vec![2]);
    }
}
