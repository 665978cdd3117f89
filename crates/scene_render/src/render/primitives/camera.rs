//! # 3D Camera
//!
//! Perspective camera with cached view-projection and frustum.
//!
//! Setters only mark the camera for recalculation. The matrices and frustum
//! are rebuilt by [`Camera::refresh_view_projection`], which a scene render
//! calls once per look. A rebuild also raises the invalidated flag so scenes
//! know cached distances to this camera are stale; the render system clears
//! it after every render target has been drawn.
//!
//! # Coordinate System
//! Right-handed Y-up view space. The clip transform flips Y and Z, and the
//! projection maps depth to [0, 1]: VP = P × X × V.

use crate::foundation::collections::new_key_type;
use crate::foundation::math::{Mat4, Mat4Ext, Point3, Vec3, utils};
use crate::scene::bounds::{BoundingVolume, Frustum};

new_key_type! {
    /// Identifier of a camera owned by the render system
    pub struct CameraId;
}

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    /// Vertical field of view in radians
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,

    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    frustum: Frustum,

    recalc: bool,
    invalidated: bool,
}

impl Camera {
    /// Create a perspective camera looking at the origin with +Y up
    ///
    /// # Example
    /// ```rust
    /// use scene_render::foundation::math::Vec3;
    /// use scene_render::render::primitives::Camera;
    ///
    /// let camera = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), 75.0, 16.0 / 9.0, 0.1, 100.0);
    /// assert!(camera.is_invalidated());
    /// ```
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
            view: Mat4::identity(),
            projection: Mat4::identity(),
            view_projection: Mat4::identity(),
            frustum: Frustum::from_matrix(&Mat4::identity()),
            recalc: true,
            invalidated: false,
        };
        camera.refresh_view_projection();
        camera
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Look-at point in world space
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.recalc = true;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Move the camera by `delta`, keeping its target
    pub fn move_by(&mut self, delta: Vec3) {
        self.set_position(self.position + delta);
    }

    /// Point the camera at `target`
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.recalc = true;
    }

    /// Point the camera at `target` with a custom up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        self.recalc = true;
    }

    /// Update the aspect ratio after a viewport change
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::info!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
        self.recalc = true;
    }

    /// Change the clipping planes
    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.recalc = true;
    }

    /// Rebuild matrices and frustum if a setter ran since the last refresh
    ///
    /// Returns whether anything was rebuilt.
    pub fn refresh_view_projection(&mut self) -> bool {
        if !self.recalc {
            return false;
        }

        self.view = Mat4::look_at(self.position, self.target, self.up);
        self.projection = Mat4::perspective(self.fov, self.aspect, self.near, self.far);
        self.view_projection = self.projection * Mat4::clip_coordinate_transform() * self.view;
        self.frustum = Frustum::from_matrix(&self.view_projection);

        self.recalc = false;
        self.invalidated = true;
        true
    }

    /// View matrix as of the last refresh
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// Projection matrix as of the last refresh
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// Combined P × X × V as of the last refresh
    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Frustum as of the last refresh
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Whether the camera changed during the current frame
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Whether a setter ran since the last refresh
    pub fn needs_refresh(&self) -> bool {
        self.recalc
    }

    /// Clear the per-frame invalidated flag
    pub fn validate(&mut self) {
        self.invalidated = false;
    }

    /// Euclidean distance from the camera position to `point`
    pub fn distance_to(&self, point: &Point3) -> f32 {
        (point.coords - self.position).norm()
    }

    /// Whether a world-space volume intersects the camera frustum
    pub fn test_volume(&self, volume: &BoundingVolume) -> bool {
        self.frustum.test_volume(volume)
    }
}

impl Default for Camera {
    /// Above and behind the origin, 45 degree field of view, 16:9
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 3.0, 3.0), 45.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_camera_is_invalidated() {
        let mut camera = Camera::default();
        assert!(camera.is_invalidated());
        assert!(!camera.needs_refresh());

        camera.validate();
        assert!(!camera.is_invalidated());
        assert!(!camera.refresh_view_projection());
    }

    #[test]
    fn test_setter_defers_until_refresh() {
        let mut camera = Camera::default();
        camera.validate();
        let before = *camera.view_projection();

        camera.set_position(Vec3::new(0.0, 0.0, 10.0));
        assert!(camera.needs_refresh());
        assert_eq!(*camera.view_projection(), before);

        assert!(camera.refresh_view_projection());
        assert!(camera.is_invalidated());
        assert_ne!(*camera.view_projection(), before);
    }

    #[test]
    fn test_distance_to() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 1.0, 0.1, 100.0);
        assert_relative_eq!(camera.distance_to(&Point3::new(0.0, 0.0, -5.0)), 10.0);
    }

    #[test]
    fn test_target_in_front_is_visible() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 1.0, 0.1, 100.0);
        let near_origin = BoundingVolume::from_min_max(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(0.5, 0.5, 0.5));
        let behind = BoundingVolume::from_min_max(Vec3::new(-0.5, -0.5, 9.5), Vec3::new(0.5, 0.5, 10.5));

        assert!(camera.test_volume(&near_origin));
        assert!(!camera.test_volume(&behind));
    }
}
