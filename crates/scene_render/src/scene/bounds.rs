//! Bounding volumes and frustum tests
//!
//! Every drawable chunk carries a [`BoundingVolume`]: the eight corners of its
//! axis-aligned box plus an enclosing sphere. Render nodes keep a world-space
//! copy, recomputed when the node or its mesh changes, and test it against
//! the camera [`Frustum`] sphere-first, box-second.

use crate::foundation::math::{Mat4, Point3, Vec3, Vec4};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }
}

/// Box corners plus an enclosing sphere
///
/// A volume with zero radius has not been set up and is treated as always
/// visible by frustum tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingVolume {
    corners: [Point3; 8],
    center: Point3,
    radius: f32,
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self {
            corners: [Point3::origin(); 8],
            center: Point3::origin(),
            radius: 0.0,
        }
    }
}

impl BoundingVolume {
    /// Build the volume enclosing the box `[min, max]`
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let corners = [
            Point3::new(min.x, min.y, min.z),
            Point3::new(min.x, max.y, min.z),
            Point3::new(max.x, max.y, min.z),
            Point3::new(max.x, min.y, min.z),
            Point3::new(min.x, min.y, max.z),
            Point3::new(min.x, max.y, max.z),
            Point3::new(max.x, max.y, max.z),
            Point3::new(max.x, min.y, max.z),
        ];
        let half = (max - min) * 0.5;

        Self {
            corners,
            center: Point3::from(min + half),
            radius: half.norm(),
        }
    }

    /// Build the volume enclosing `aabb`
    pub fn from_aabb(aabb: &AABB) -> Self {
        Self::from_min_max(aabb.min, aabb.max)
    }

    /// Box corners
    pub fn corners(&self) -> &[Point3; 8] {
        &self.corners
    }

    /// Sphere center
    pub fn center(&self) -> Point3 {
        self.center
    }

    /// Sphere radius
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Whether the volume was set up
    pub fn is_set(&self) -> bool {
        self.radius > 0.0
    }

    /// The volume mapped through `transform`
    ///
    /// Corners and center are transformed as points. The radius reaches the
    /// farthest transformed corner, so the sphere still encloses the box under
    /// shear from non-uniform parent scale.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let mut corners = self.corners;
        for corner in &mut corners {
            *corner = transform.transform_point(corner);
        }
        let center = transform.transform_point(&self.center);
        let radius = corners
            .iter()
            .map(|corner| (*corner - center).norm())
            .fold(0.0_f32, f32::max);

        Self { corners, center, radius }
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the frustum
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane from `ax + by + cz + d` coefficients, normalized
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length > f32::EPSILON {
            Self {
                normal: normal / length,
                distance: coefficients.w / length,
            }
        } else {
            Self {
                normal,
                distance: coefficients.w,
            }
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Point3) -> f32 {
        self.normal.dot(&point.coords) + self.distance
    }
}

/// Six inward-facing planes: left, right, bottom, top, near, far
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Frustum planes
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip space with depth in [0, 1].
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| {
            Vec4::new(
                vp_matrix[(i, 0)],
                vp_matrix[(i, 1)],
                vp_matrix[(i, 2)],
                vp_matrix[(i, 3)],
            )
        };
        let (x, y, z, w) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(w + x),
                Plane::from_coefficients(w - x),
                Plane::from_coefficients(w + y),
                Plane::from_coefficients(w - y),
                Plane::from_coefficients(z),
                Plane::from_coefficients(w - z),
            ],
        }
    }

    /// Test a world-space volume: sphere first, then box corners
    ///
    /// The volume is rejected when its sphere lies fully behind any plane, or
    /// when all eight corners lie behind a single plane.
    pub fn test_volume(&self, volume: &BoundingVolume) -> bool {
        if !volume.is_set() {
            return true;
        }

        let center = volume.center();
        if self
            .planes
            .iter()
            .any(|plane| plane.distance_to_point(&center) <= -volume.radius())
        {
            return false;
        }

        !self.planes.iter().any(|plane| {
            volume
                .corners()
                .iter()
                .all(|corner| plane.distance_to_point(corner) <= 0.0)
        })
    }
}
