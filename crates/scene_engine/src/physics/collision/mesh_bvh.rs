//! Bounding volume hierarchy over a triangle list
//!
//! Built once per mesh by median split on the longest axis of the triangle
//! centers. Nodes sit in one flat array; a leaf owns a contiguous run of
//! `order`, which indexes back into the caller's triangle slice.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::bounds::AABB;
use super::primitives::{Ray, Triangle};
use crate::foundation::math::Vec3;

/// Triangles per leaf before a node splits
const LEAF_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
enum BvhNodeKind {
    Leaf { start: u32, count: u32 },
    Branch { left: u32, right: u32 },
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: AABB,
    kind: BvhNodeKind,
}

/// Node waiting in the ray traversal, nearest entry first
struct Pending {
    entry: f32,
    node: u32,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.entry.total_cmp(&self.entry).then_with(|| other.node.cmp(&self.node))
    }
}

/// Triangle BVH for ray picking
#[derive(Debug, Clone, Default)]
pub struct MeshBvh {
    nodes: Vec<BvhNode>,
    order: Vec<u32>,
}

impl MeshBvh {
    /// Build over `triangles`; indices in results refer to this slice
    pub fn build(triangles: &[Triangle]) -> Self {
        let mut bvh = Self {
            nodes: Vec::with_capacity(triangles.len().div_ceil(LEAF_SIZE) * 2),
            order: (0..triangles.len()).filter_map(|i| u32::try_from(i).ok()).collect(),
        };
        if bvh.order.is_empty() {
            return bvh;
        }

        let centers: Vec<Vec3> = triangles.iter().map(|t| (t.v0 + t.v1 + t.v2) / 3.0).collect();
        let count = bvh.order.len();
        bvh.build_node(triangles, &centers, 0, count);
        bvh
    }

    fn build_node(&mut self, triangles: &[Triangle], centers: &[Vec3], start: usize, count: usize) -> u32 {
        let run = &mut self.order[start..start + count];
        let bounds = AABB::from_points(run.iter().flat_map(|&i| {
            let tri = &triangles[i as usize];
            [tri.v0, tri.v1, tri.v2]
        }))
        .unwrap_or_else(|| AABB::new(Vec3::zeros(), Vec3::zeros()));

        let index = self.nodes.len() as u32;
        self.nodes.push(BvhNode {
            bounds,
            kind: BvhNodeKind::Leaf { start: start as u32, count: count as u32 },
        });
        if count <= LEAF_SIZE {
            return index;
        }

        let extents = bounds.extents();
        let axis = if extents.y > extents.x && extents.y >= extents.z {
            1
        } else if extents.z > extents.x && extents.z >= extents.y {
            2
        } else {
            0
        };

        let half = count / 2;
        run.select_nth_unstable_by(half, |a, b| centers[*a as usize][axis].total_cmp(&centers[*b as usize][axis]));

        let left = self.build_node(triangles, centers, start, half);
        let right = self.build_node(triangles, centers, start + half, count - half);
        self.nodes[index as usize].kind = BvhNodeKind::Branch { left, right };
        index
    }

    /// Number of nodes, leaves included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of every triangle, `None` for an empty mesh
    pub fn bounds(&self) -> Option<AABB> {
        self.nodes.first().map(|root| root.bounds)
    }

    /// Closest triangle hit as `(t, triangle index)`
    ///
    /// Nodes are visited in order of ray entry; traversal ends once the next
    /// node starts beyond the best hit so far.
    pub fn intersect_ray(&self, triangles: &[Triangle], ray: &Ray) -> Option<(f32, usize)> {
        let root = self.nodes.first()?;
        let entry = root.bounds.intersect_ray(ray)?;

        let mut best: Option<(f32, usize)> = None;
        let mut heap = BinaryHeap::new();
        heap.push(Pending { entry, node: 0 });

        while let Some(Pending { entry, node }) = heap.pop() {
            if best.is_some_and(|(t, _)| entry > t) {
                break;
            }

            match self.nodes[node as usize].kind {
                BvhNodeKind::Branch { left, right } => {
                    for child in [left, right] {
                        if let Some(entry) = self.nodes[child as usize].bounds.intersect_ray(ray) {
                            heap.push(Pending { entry, node: child });
                        }
                    }
                }
                BvhNodeKind::Leaf { start, count } => {
                    for &triangle in &self.order[start as usize..(start + count) as usize] {
                        let Some(tri) = triangles.get(triangle as usize) else {
                            continue;
                        };
                        let Some((t, _, _)) = tri.intersect_ray(ray) else {
                            continue;
                        };
                        let index = triangle as usize;
                        let closer = match best {
                            None => true,
                            Some((best_t, best_index)) => t.total_cmp(&best_t).then(index.cmp(&best_index)) == Ordering::Less,
                        };
                        if closer {
                            best = Some((t, index));
                        }
                    }
                }
            }
        }

        best
    }
}
