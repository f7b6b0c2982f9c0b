//! Math utilities and types
//!
//! Provides the fundamental math types used by the scene hierarchy and the
//! spatial index. All coordinates follow Y-up right-handed conventions.

pub use nalgebra::{
    Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Create from position, rotation and scale
    pub fn from_parts(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Builder pattern: Set scale (non-uniform)
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Builder pattern: Set scale (uniform)
    #[must_use]
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, scale);
        self
    }

    /// Convert to a transformation matrix (TRS order)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Decompose a transformation matrix into translation, rotation and scale
    ///
    /// Shear introduced by non-uniform scale under a rotated parent cannot be
    /// represented and is dropped. A mirrored basis is reported as a negative
    /// X scale.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let position = translation_of(&matrix);
        let basis = upper_3x3(&matrix);

        let mut scale = Vec3::new(
            basis.column(0).magnitude(),
            basis.column(1).magnitude(),
            basis.column(2).magnitude(),
        );
        if basis.determinant() < 0.0 {
            scale.x = -scale.x;
        }

        let safe = scale.map(|s| if s.abs() < constants::EPSILON { 1.0 } else { s });
        let mut rotation_matrix = basis;
        for (column, factor) in safe.iter().enumerate() {
            let normalized = rotation_matrix.column(column) / *factor;
            rotation_matrix.set_column(column, &normalized);
        }
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self { position, rotation, scale }
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Tolerance for geometric comparisons; separations below it count as touching
    pub const EPSILON: f32 = 1e-5;

    /// Smallest scale magnitude a transform may carry on any axis
    pub const MIN_SCALE: f32 = 0.01;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Vec3};

    /// Clamp every scale component away from zero, keeping its sign
    ///
    /// Returns the clamped scale and whether any component changed.
    pub fn clamp_scale(scale: Vec3, min_scale: f32) -> (Vec3, bool) {
        let mut clamped = false;
        let result = scale.map(|s| {
            if s.is_nan() {
                clamped = true;
                min_scale
            } else if s.abs() < min_scale {
                clamped = true;
                if s.is_sign_negative() { -min_scale } else { min_scale }
            } else {
                s
            }
        });
        (result, clamped)
    }

    /// Normalize a vector, falling back when it is too short to have a direction
    pub fn normalize_or(vector: Vec3, fallback: Vec3) -> Vec3 {
        let length = vector.magnitude();
        if length > constants::EPSILON {
            vector / length
        } else {
            fallback
        }
    }
}

/// Extract the translation column of an affine matrix
pub fn translation_of(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix.m14, matrix.m24, matrix.m34)
}

/// Extract the rotation+scale block of an affine matrix
pub fn upper_3x3(matrix: &Mat4) -> Mat3 {
    matrix.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a perspective projection matrix (looking down +Z, depth mapped to [0, 1])
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // P = [a⁻¹/tan(φ/2)    0              0                    0           ]
        //     [0               1/tan(φ/2)     0                    0           ]
        //     [0               0              f/(f-n)              -nf/(f-n)   ]
        //     [0               0              1                    0           ]
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        // View space looks down +Z to match `perspective`
        let forward = utils::normalize_or(target - eye, Vec3::z());
        let fallback_up = if forward.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        let right = utils::normalize_or(up.cross(&forward), fallback_up.cross(&forward).normalize());
        let camera_up = forward.cross(&right);

        let translation = Mat4::new_translation(&-eye);

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            forward.x, forward.y, forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }
}
