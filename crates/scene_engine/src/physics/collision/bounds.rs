//! Box and capsule bounding volumes
//!
//! `AABB` is the currency of the spatial index; `OBB` and `Capsule` are
//! tighter narrow-phase shapes that can always be widened back to an `AABB`.
//! Overlap tests treat a separation within [`EPSILON`] as touching, not
//! intersecting, so resting contact does not flicker between frames.

use serde::{Deserialize, Serialize};

use super::primitives::{closest_point_on_segment, closest_points_between_segments, BoundingSphere, Ray};
use crate::foundation::math::{
    constants::EPSILON, upper_3x3, utils::normalize_or, Mat3, Mat4, Point3, Quat,
    Transform, Vec3,
};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box enclosing all given points, `None` for an empty set
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |bounds, p| Self {
            min: bounds.min.inf(&p),
            max: bounds.max.sup(&p),
        }))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether min <= max on every axis
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another
    pub fn contains(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this AABB intersects another AABB (boundary contact counts)
    ///
    /// Used for index membership, where over-inclusion is always safe.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Strict overlap: every axis must overlap by more than [`EPSILON`]
    pub fn overlaps(&self, other: &Self) -> bool {
        (0..3).all(|axis| {
            self.max[axis] - other.min[axis] > EPSILON && other.max[axis] - self.min[axis] > EPSILON
        })
    }

    /// Smallest box enclosing both boxes
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Box grown by `margin` on every side
    #[must_use]
    pub fn expanded(&self, margin: f32) -> Self {
        let margin = Vec3::new(margin, margin, margin);
        Self::new(self.min - margin, self.max + margin)
    }

    /// The eight corners, bit 0/1/2 of the index selecting max on X/Y/Z
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            )
        })
    }

    /// Axis-realigned box around this box's eight corners after `matrix`
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self
            .corners()
            .map(|corner| matrix.transform_point(&Point3::from(corner)).coords);
        Self::from_points(corners).unwrap_or(*self)
    }

    /// Child box for one octant, bit 0/1/2 of `index` selecting the upper half on X/Y/Z
    ///
    /// Octant layout:
    /// 0: -X, -Y, -Z    4: -X, -Y, +Z
    /// 1: +X, -Y, -Z    5: +X, -Y, +Z
    /// 2: -X, +Y, -Z    6: -X, +Y, +Z
    /// 3: +X, +Y, -Z    7: +X, +Y, +Z
    #[must_use]
    pub fn octant(&self, index: usize) -> Self {
        let center = self.center();
        let pick = |bit: usize, axis: usize| {
            if index & bit != 0 {
                (center[axis], self.max[axis])
            } else {
                (self.min[axis], center[axis])
            }
        };
        let (min_x, max_x) = pick(1, 0);
        let (min_y, max_y) = pick(2, 1);
        let (min_z, max_z) = pick(4, 2);
        Self::new(Vec3::new(min_x, min_y, min_z), Vec3::new(max_x, max_y, max_z))
    }

    /// Closest point inside the box to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Squared distance from `point` to the box (0 inside)
    pub fn distance_squared_to_point(&self, point: Vec3) -> f32 {
        (self.closest_point(point) - point).magnitude_squared()
    }

    /// Slab test returning the parametric interval the ray spends inside the box
    ///
    /// The entry parameter is clamped to 0 when the origin is inside.
    pub fn intersect_ray_interval(&self, ray: &Ray) -> Option<(f32, f32)> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];

            if direction.abs() <= f32::EPSILON {
                // Parallel to this slab: must already be between its planes
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let mut t0 = (self.min[axis] - origin) * inv;
            let mut t1 = (self.max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        if t_exit < 0.0 {
            return None;
        }

        Some((t_enter.max(0.0), t_exit))
    }

    /// Test ray intersection with this AABB using slab method
    /// Returns the distance to the entry point if the ray intersects, None otherwise
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        self.intersect_ray_interval(ray).map(|(t_enter, _)| t_enter)
    }
}

/// Oriented Bounding Box
///
/// `extents` are half sizes before `scale_rotation` is applied; the world
/// half size along box axis `i` is `extents[i] * |scale_rotation.column(i)|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OBB {
    /// World-space center
    pub center: Vec3,
    /// Half sizes in the box's unscaled local frame
    pub extents: Vec3,
    /// Rotation and scale (no translation)
    pub scale_rotation: Mat3,
}

/// Orthonormal frame used by the separating-axis tests
struct BoxFrame {
    center: Vec3,
    axes: [Vec3; 3],
    half: Vec3,
}

impl BoxFrame {
    fn project_radius(&self, axis: &Vec3) -> f32 {
        (0..3).map(|i| self.half[i] * self.axes[i].dot(axis).abs()).sum()
    }
}

impl OBB {
    /// Create an OBB from its parts
    pub const fn new(center: Vec3, extents: Vec3, scale_rotation: Mat3) -> Self {
        Self { center, extents, scale_rotation }
    }

    /// Axis-aligned OBB equivalent to `aabb`
    pub fn from_aabb(aabb: &AABB) -> Self {
        Self::new(aabb.center(), aabb.extents(), Mat3::identity())
    }

    /// Unit box axes in world space
    pub fn axes(&self) -> [Vec3; 3] {
        let fallback = [Vec3::x(), Vec3::y(), Vec3::z()];
        std::array::from_fn(|i| normalize_or(self.scale_rotation.column(i).into_owned(), fallback[i]))
    }

    /// World-space half size along each box axis
    pub fn world_half_extents(&self) -> Vec3 {
        Vec3::new(
            self.extents.x * self.scale_rotation.column(0).magnitude(),
            self.extents.y * self.scale_rotation.column(1).magnitude(),
            self.extents.z * self.scale_rotation.column(2).magnitude(),
        )
    }

    fn frame(&self) -> BoxFrame {
        BoxFrame {
            center: self.center,
            axes: self.axes(),
            half: self.world_half_extents(),
        }
    }

    /// World-space corners
    pub fn corners(&self) -> [Vec3; 8] {
        let local = AABB::from_center_extents(Vec3::zeros(), self.extents);
        local.corners().map(|corner| self.center + self.scale_rotation * corner)
    }

    /// Axis-aligned box enclosing the eight corners
    pub fn to_aabb(&self) -> AABB {
        AABB::from_points(self.corners())
            .unwrap_or_else(|| AABB::from_center_extents(self.center, Vec3::zeros()))
    }

    /// This box carried through an affine matrix
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            center: matrix.transform_point(&Point3::from(self.center)).coords,
            extents: self.extents,
            scale_rotation: upper_3x3(matrix) * self.scale_rotation,
        }
    }

    /// Closest point on or inside the box to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let frame = self.frame();
        let offset = point - frame.center;
        let mut result = frame.center;
        for i in 0..3 {
            let distance = offset.dot(&frame.axes[i]).clamp(-frame.half[i], frame.half[i]);
            result += frame.axes[i] * distance;
        }
        result
    }

    /// Ray test performed in the box's local space against the slab method
    ///
    /// The local ray keeps the world ray's parameterization, so the returned
    /// distance is a world distance.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let inverse = self.scale_rotation.try_inverse()?;
        let local_ray = Ray::new_unnormalized(
            inverse * (ray.origin - self.center),
            inverse * ray.direction,
        );
        AABB::from_center_extents(Vec3::zeros(), self.extents).intersect_ray(&local_ray)
    }

    /// Separating-axis test against another OBB
    ///
    /// Candidate axes: 3 face normals of each box plus the 9 pairwise edge
    /// cross products. Near-parallel edge pairs produce no usable axis and
    /// are skipped; the face axes already cover that case.
    pub fn intersects_obb(&self, other: &Self) -> bool {
        let a = self.frame();
        let b = other.frame();
        let translation = b.center - a.center;

        let separates = |axis: Vec3| {
            let length_squared = axis.magnitude_squared();
            if length_squared < 1e-6 {
                return false;
            }
            let axis = axis / length_squared.sqrt();
            let distance = translation.dot(&axis).abs();
            a.project_radius(&axis) + b.project_radius(&axis) - distance <= EPSILON
        };

        if a.axes.iter().chain(b.axes.iter()).any(|axis| separates(*axis)) {
            return false;
        }

        for edge_a in &a.axes {
            for edge_b in &b.axes {
                if separates(edge_a.cross(edge_b)) {
                    return false;
                }
            }
        }

        true
    }

    /// Separating-axis test against an AABB
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.intersects_obb(&Self::from_aabb(aabb))
    }

    /// Sphere test through the closest point on the box
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let distance = (self.closest_point(sphere.center) - sphere.center).magnitude();
        sphere.radius - distance > EPSILON
    }
}

/// Capsule: a segment swept by a sphere, with its axis along local +Y
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    /// World-space center of the segment
    pub center: Vec3,
    /// Orientation of the capsule axis
    pub rotation: Quat,
    /// Radius of the swept sphere
    pub radius: f32,
    /// Half the length of the inner segment (excluding the hemispheres)
    pub half_height: f32,
}

impl Capsule {
    /// Create a capsule from its parts
    pub const fn new(center: Vec3, rotation: Quat, radius: f32, half_height: f32) -> Self {
        Self { center, rotation, radius, half_height }
    }

    /// Unit axis of the capsule
    pub fn axis(&self) -> Vec3 {
        self.rotation * Vec3::y()
    }

    /// The two hemisphere centers
    pub fn segment(&self) -> (Vec3, Vec3) {
        let offset = self.axis() * self.half_height;
        (self.center - offset, self.center + offset)
    }

    /// Axis-aligned box enclosing the capsule
    pub fn to_aabb(&self) -> AABB {
        let (a, b) = self.segment();
        AABB::new(a.inf(&b), a.sup(&b)).expanded(self.radius)
    }

    /// This capsule carried through an affine matrix
    ///
    /// The segment endpoints are transformed directly, so the axis follows
    /// non-uniform scale. The radius takes the largest axis scale so the
    /// result always encloses the transformed shape.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let to_world = |v: Vec3| matrix.transform_point(&Point3::from(v)).coords;
        let (a, b) = self.segment();
        let (a, b) = (to_world(a), to_world(b));

        let basis = upper_3x3(matrix);
        let radius_scale = (0..3)
            .map(|i| basis.column(i).magnitude())
            .fold(0.0_f32, f32::max);

        // Start from the rotated frame, then swing its Y onto the real axis
        let frame = Transform::from_matrix(*matrix).rotation * self.rotation;
        let span = b - a;
        let rotation = if span.magnitude() > EPSILON {
            Quat::rotation_between(&(frame * Vec3::y()), &span)
                .map_or(frame, |swing| swing * frame)
        } else {
            frame
        };

        Self {
            center: (a + b) * 0.5,
            rotation,
            radius: self.radius * radius_scale,
            half_height: span.magnitude() * 0.5,
        }
    }

    /// Distance from `point` to the capsule's inner segment
    pub fn distance_to_segment(&self, point: Vec3) -> f32 {
        let (a, b) = self.segment();
        (closest_point_on_segment(point, a, b) - point).magnitude()
    }

    /// Ray test: cylinder body plus both hemispheres, nearest entry wins
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        if self.distance_to_segment(ray.origin) <= self.radius {
            return Some(0.0);
        }

        let (a, b) = self.segment();
        let caps = [a, b]
            .into_iter()
            .filter_map(|cap| BoundingSphere::new(cap, self.radius).intersect_ray(ray));

        let body = {
            let ba = b - a;
            let oa = ray.origin - a;
            let baba = ba.dot(&ba);
            let bard = ba.dot(&ray.direction);
            let baoa = ba.dot(&oa);
            let rdoa = ray.direction.dot(&oa);
            let oaoa = oa.dot(&oa);
            let rdrd = ray.direction.dot(&ray.direction);

            let k2 = baba * rdrd - bard * bard;
            let k1 = baba * rdoa - baoa * bard;
            let k0 = baba * oaoa - baoa * baoa - self.radius * self.radius * baba;
            let h = k1 * k1 - k2 * k0;

            if k2 > f32::EPSILON && h >= 0.0 {
                let t = (-k1 - h.sqrt()) / k2;
                let y = baoa + t * bard;
                (t >= 0.0 && y > 0.0 && y < baba).then_some(t)
            } else {
                None
            }
        };

        caps.chain(body).min_by(f32::total_cmp)
    }

    /// Sphere test against the inner segment
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.radius + sphere.radius - self.distance_to_segment(sphere.center) > EPSILON
    }

    /// Capsule-capsule test through the closest points of both segments
    pub fn intersects_capsule(&self, other: &Self) -> bool {
        let (p1, q1) = self.segment();
        let (p2, q2) = other.segment();
        let (c1, c2) = closest_points_between_segments(p1, q1, p2, q2);
        self.radius + other.radius - (c1 - c2).magnitude() > EPSILON
    }

    /// Capsule-box test
    ///
    /// The distance from a point to a convex box is convex along the segment,
    /// so a ternary search finds the segment's minimum distance.
    pub fn intersects_box<F>(&self, distance_to_box: F) -> bool
    where
        F: Fn(Vec3) -> f32,
    {
        const ITERATIONS: usize = 48;

        let (a, b) = self.segment();
        let at = |s: f32| distance_to_box(a + (b - a) * s);

        let (mut low, mut high) = (0.0_f32, 1.0_f32);
        for _ in 0..ITERATIONS {
            let m1 = low + (high - low) / 3.0;
            let m2 = high - (high - low) / 3.0;
            if at(m1) <= at(m2) {
                high = m2;
            } else {
                low = m1;
            }
        }

        let nearest = at(0.5 * (low + high)).min(at(0.0)).min(at(1.0));
        self.radius - nearest > EPSILON
    }

    /// Capsule-AABB test
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.intersects_box(|p| aabb.distance_squared_to_point(p).sqrt())
    }

    /// Capsule-OBB test
    pub fn intersects_obb(&self, obb: &OBB) -> bool {
        self.intersects_box(|p| (obb.closest_point(p) - p).magnitude())
    }
}
