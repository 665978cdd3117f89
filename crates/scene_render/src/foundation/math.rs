//! Math utilities and types
//!
//! Provides fundamental math types for scene transforms, bounds and camera projection.

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
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position relative to the parent
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

    /// Convert to a transformation matrix (translation * rotation * scale)
    pub fn to_matrix(&self) -> Mat4 {
        let mut matrix = Mat4::new_translation(&self.position) * self.rotation.to_homogeneous();
        if self.scale != Vec3::new(1.0, 1.0, 1.0) {
            matrix *= Mat4::new_nonuniform_scaling(&self.scale);
        }
        matrix
    }
}

/// Math utility functions
pub mod utils {
    use super::*;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Normal matrix of a world transform: inverse transpose of its upper 3x3 block.
    ///
    /// Falls back to the plain upper 3x3 block when the transform is singular
    /// (zero scale on some axis).
    pub fn normal_matrix(world: &Mat4) -> Mat3 {
        let upper: Mat3 = world.fixed_view::<3, 3>(0, 0).into_owned();
        upper
            .try_inverse()
            .map_or(upper, |inverse| inverse.transpose())
    }

    /// Column-major array layout of a matrix, as consumed by shaders
    pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
        (*matrix).into()
    }

    /// Pad a 3x3 matrix into a std140-friendly 4x4 column layout
    pub fn mat3_to_padded_columns(matrix: &Mat3) -> [[f32; 4]; 4] {
        let mut padded = Mat4::identity();
        padded.fixed_view_mut::<3, 3>(0, 0).copy_from(matrix);
        padded.into()
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a perspective projection matrix with depth mapped to [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Intermediate transform flipping Y and Z so view space matches the
    /// Y-down, Z-forward clip convention
    fn clip_coordinate_transform() -> Mat4;
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
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new_translation(&-eye);

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn clip_coordinate_transform() -> Mat4 {
        Mat4::new(
            1.0,  0.0,  0.0, 0.0,
            0.0, -1.0,  0.0, 0.0,
            0.0,  0.0, -1.0, 0.0,
            0.0,  0.0,  0.0, 1.0,
        )
    }
}
