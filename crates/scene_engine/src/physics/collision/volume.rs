//! Tagged bounding volume attached to scene entities
//!
//! A volume is authored in MODEL SPACE and carried into world space with the
//! owner's world matrix whenever the update scheduler gets to it. Queries
//! read the synced world copy; the model-space copy is never mutated.

use super::bounds::{Capsule, AABB, OBB};
use super::primitives::{BoundingSphere, Ray};
use crate::foundation::math::{upper_3x3, Mat4, Point3, Vec3};

/// Discriminant of a [`BoundingVolume`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    /// Axis-aligned box
    Aabb,
    /// Oriented box
    Obb,
    /// Sphere
    Sphere,
    /// Capsule
    Capsule,
}

/// Bounding volume variants
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    /// Axis-aligned box; stays axis aligned under rotation by growing
    Aabb(AABB),
    /// Oriented box
    Obb(OBB),
    /// Sphere; non-uniform scale takes the largest axis
    Sphere(BoundingSphere),
    /// Capsule along local +Y
    Capsule(Capsule),
}

impl BoundingVolume {
    /// Which variant this is
    pub fn kind(&self) -> VolumeKind {
        match self {
            Self::Aabb(_) => VolumeKind::Aabb,
            Self::Obb(_) => VolumeKind::Obb,
            Self::Sphere(_) => VolumeKind::Sphere,
            Self::Capsule(_) => VolumeKind::Capsule,
        }
    }

    /// Geometric center
    pub fn center(&self) -> Vec3 {
        match self {
            Self::Aabb(aabb) => aabb.center(),
            Self::Obb(obb) => obb.center,
            Self::Sphere(sphere) => sphere.center,
            Self::Capsule(capsule) => capsule.center,
        }
    }

    /// Enclosing axis-aligned box, used as the spatial index key
    pub fn to_aabb(&self) -> AABB {
        match self {
            Self::Aabb(aabb) => *aabb,
            Self::Obb(obb) => obb.to_aabb(),
            Self::Sphere(sphere) => {
                let r = sphere.radius;
                AABB::from_center_extents(sphere.center, Vec3::new(r, r, r))
            }
            Self::Capsule(capsule) => capsule.to_aabb(),
        }
    }

    /// This volume carried from model space into the space of `matrix`
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        match self {
            Self::Aabb(aabb) => Self::Aabb(aabb.transformed(matrix)),
            Self::Obb(obb) => Self::Obb(obb.transformed(matrix)),
            Self::Sphere(sphere) => {
                let basis = upper_3x3(matrix);
                let max_scale = (0..3)
                    .map(|i| basis.column(i).magnitude())
                    .fold(0.0_f32, f32::max);
                Self::Sphere(BoundingSphere::new(
                    matrix.transform_point(&Point3::from(sphere.center)).coords,
                    sphere.radius * max_scale,
                ))
            }
            Self::Capsule(capsule) => Self::Capsule(capsule.transformed(matrix)),
        }
    }

    /// Overwrite `self` with `local` carried through `world`
    pub fn update(&mut self, local: &Self, world: &Mat4) {
        *self = local.transformed(world);
    }

    /// Distance along `ray` to the first contact, 0 when the origin is inside
    pub fn raycast(&self, ray: &Ray) -> Option<f32> {
        match self {
            Self::Aabb(aabb) => aabb.intersect_ray(ray),
            Self::Obb(obb) => obb.intersect_ray(ray),
            Self::Sphere(sphere) => sphere.intersect_ray(ray),
            Self::Capsule(capsule) => capsule.intersect_ray(ray),
        }
    }

    /// Whether `ray` touches this volume at all
    pub fn raycast_hit(&self, ray: &Ray) -> bool {
        self.raycast(ray).is_some()
    }

    /// Narrow-phase overlap test, defined for every pair of variants
    ///
    /// Touching volumes do not intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        use BoundingVolume::{Aabb, Capsule as Cap, Obb, Sphere};

        match (self, other) {
            (Aabb(a), Aabb(b)) => a.overlaps(b),
            (Aabb(a), Obb(b)) | (Obb(b), Aabb(a)) => b.intersects_aabb(a),
            (Obb(a), Obb(b)) => a.intersects_obb(b),

            (Sphere(a), Sphere(b)) => a.intersects(b),
            (Sphere(s), Aabb(b)) | (Aabb(b), Sphere(s)) => {
                s.radius * s.radius - b.distance_squared_to_point(s.center) > sphere_tolerance(s.radius)
            }
            (Sphere(s), Obb(b)) | (Obb(b), Sphere(s)) => b.intersects_sphere(s),

            (Cap(a), Cap(b)) => a.intersects_capsule(b),
            (Cap(c), Sphere(s)) | (Sphere(s), Cap(c)) => c.intersects_sphere(s),
            (Cap(c), Aabb(b)) | (Aabb(b), Cap(c)) => c.intersects_aabb(b),
            (Cap(c), Obb(b)) | (Obb(b), Cap(c)) => c.intersects_obb(b),
        }
    }
}

/// Squared-distance tolerance matching a linear gap of `EPSILON` at `radius`
fn sphere_tolerance(radius: f32) -> f32 {
    use crate::foundation::math::constants::EPSILON;
    let inner = (radius - EPSILON).max(0.0);
    radius * radius - inner * inner
}

impl From<AABB> for BoundingVolume {
    fn from(aabb: AABB) -> Self {
        Self::Aabb(aabb)
    }
}

impl From<OBB> for BoundingVolume {
    fn from(obb: OBB) -> Self {
        Self::Obb(obb)
    }
}

impl From<BoundingSphere> for BoundingVolume {
    fn from(sphere: BoundingSphere) -> Self {
        Self::Sphere(sphere)
    }
}

impl From<Capsule> for BoundingVolume {
    fn from(capsule: Capsule) -> Self {
        Self::Capsule(capsule)
    }
}
