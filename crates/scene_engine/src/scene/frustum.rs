//! View frustum for visibility culling

use crate::foundation::math::{utils::normalize_or, Mat4, Vec3, Vec4};
use crate::physics::collision::{BoundingSphere, AABB};

/// Plane defined by normal and distance from origin
///
/// Points with a non-negative signed distance are on the inner side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    ///
    /// The pair is rescaled together so the normal has unit length.
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            // Degenerate planes accept everything
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self { normal: normal / length, distance: distance / length }
    }

    /// Plane through `point` facing along `normal`
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normalize_or(normal, Vec3::y());
        Self { normal, distance: -normal.dot(&point) }
    }

    fn from_row(row: Vec4) -> Self {
        Self::new(Vec3::new(row.x, row.y, row.z), row.w)
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Result of classifying a volume against a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Entirely outside at least one plane
    Outside,
    /// Straddles one or more planes
    Intersecting,
    /// Entirely inside every plane
    Inside,
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six inward-facing planes
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip space with depth in [0, 1].
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self::from_planes([
            Plane::from_row(r3 + r0),
            Plane::from_row(r3 - r0),
            Plane::from_row(r3 + r1),
            Plane::from_row(r3 - r1),
            Plane::from_row(r2),
            Plane::from_row(r3 - r2),
        ])
    }

    /// Classify an AABB against all six planes
    ///
    /// A box exactly on a plane counts as inside that plane.
    pub fn classify_aabb(&self, aabb: &AABB) -> Containment {
        let mut result = Containment::Inside;

        for plane in &self.planes {
            // p-vertex: the corner furthest along the normal
            let mut p = aabb.min;
            let mut n = aabb.max;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; n.x = aabb.min.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; n.y = aabb.min.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; n.z = aabb.min.z; }

            if plane.distance_to_point(p) < 0.0 {
                return Containment::Outside;
            }
            if plane.distance_to_point(n) < 0.0 {
                result = Containment::Intersecting;
            }
        }

        result
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.classify_aabb(aabb) != Containment::Outside
    }

    /// Check if a sphere is inside or intersects the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Check if a point lies inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}
