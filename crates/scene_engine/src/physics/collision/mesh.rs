//! Triangle pick meshes
//!
//! Meshes are stored in MODEL SPACE and never rewritten. A world ray is
//! carried into model space with the owner's inverse world matrix instead,
//! so a mesh shared between many entities costs nothing per transform change.
//! The triangle BVH is built once on construction; clones share it.

use std::sync::Arc;

use super::mesh_bvh::MeshBvh;
use super::primitives::{Ray, Triangle};
use crate::foundation::math::{Mat4, Point3, Vec3};

/// Hit on a pick mesh, expressed in the ray's own space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshHit {
    /// Ray parameter of the hit
    pub t: f32,
    /// Index of the triangle that was hit
    pub triangle: usize,
}

/// Model-space triangle soup used for precise ray picking
#[derive(Debug, Clone)]
pub struct PickMesh {
    /// Triangles in model space
    triangles: Arc<[Triangle]>,
    /// Hierarchy over `triangles`
    bvh: Arc<MeshBvh>,
}

impl PickMesh {
    /// Build from model-space vertices and a triangle index list
    ///
    /// A trailing partial triangle and out-of-range indices are skipped.
    pub fn from_vertices(vertices: &[Vec3], indices: &[u32]) -> Self {
        let triangles: Vec<Triangle> = indices
            .chunks_exact(3)
            .filter_map(|chunk| {
                let v0 = *vertices.get(chunk[0] as usize)?;
                let v1 = *vertices.get(chunk[1] as usize)?;
                let v2 = *vertices.get(chunk[2] as usize)?;
                Some(Triangle::new(v0, v1, v2))
            })
            .collect();

        Self::from_triangles(triangles)
    }

    /// Build from model-space triangles
    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        Self {
            bvh: Arc::new(MeshBvh::build(&triangles)),
            triangles: triangles.into(),
        }
    }

    /// Model-space triangles
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Triangle hierarchy used for ray tests
    pub fn bvh(&self) -> &MeshBvh {
        &self.bvh
    }

    /// Whether two meshes share the same triangle data
    pub fn shares_geometry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.triangles, &other.triangles)
    }

    /// Closest hit for a ray already in model space
    pub fn intersect_local_ray(&self, ray: &Ray) -> Option<MeshHit> {
        self.bvh
            .intersect_ray(&self.triangles, ray)
            .map(|(t, triangle)| MeshHit { t, triangle })
    }

    /// Closest hit for a world ray against this mesh placed at `world_inverse⁻¹`
    ///
    /// The returned `t` is a distance along the world ray.
    pub fn intersect_world_ray(&self, ray: &Ray, world_inverse: &Mat4) -> Option<MeshHit> {
        self.intersect_local_ray(&ray.transformed(world_inverse))
    }

    /// World-space point of a hit produced by [`PickMesh::intersect_world_ray`]
    pub fn hit_point(ray: &Ray, hit: &MeshHit) -> Vec3 {
        ray.point_at(hit.t)
    }

    /// World-space triangle for a hit, for debug drawing
    pub fn world_triangle(&self, index: usize, world: &Mat4) -> Option<Triangle> {
        let tri = self.triangles.get(index)?;
        let to_world = |v: Vec3| world.transform_point(&Point3::from(v)).coords;
        Some(Triangle::new(to_world(tri.v0), to_world(tri.v1), to_world(tri.v2)))
    }
}
