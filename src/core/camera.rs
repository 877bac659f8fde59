//! Viewer camera used to drive LOD selection and frustum culling

use crate::core::types::{Mat4, Quat, Vec3};
use crate::math::Frustum;

/// Far plane distance used when none is given
pub const DEFAULT_VIEW_DISTANCE: f32 = 10_000.0;

/// Perspective viewer over the terrain
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Orientation; the camera looks down its local -Z
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Camera at `position` facing `target`, 60 degree fov, 16:9
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let view = Mat4::look_at_rh(position, target, up);
        Self {
            position,
            rotation: Quat::from_mat4(&view.inverse()),
            fov_y: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: DEFAULT_VIEW_DISTANCE,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View frustum for the current position and orientation
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_faces_target() {
        let camera = Camera::look_at(Vec3::new(5.0, 10.0, 5.0), Vec3::new(105.0, 10.0, 5.0), Vec3::Y);
        let target = camera.view_matrix().transform_point3(Vec3::new(105.0, 10.0, 5.0));
        assert!((target - Vec3::new(0.0, 0.0, -100.0)).length() < 1e-3);
    }

    #[test]
    fn test_view_matrix_moves_position_to_origin() {
        let camera = Camera::look_at(Vec3::new(10.0, 3.0, -2.0), Vec3::new(10.0, 3.0, -50.0), Vec3::Y);
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.length() < 1e-4);
    }

    #[test]
    fn test_frustum_sees_target() {
        let camera = Camera::look_at(Vec3::new(0.0, 50.0, 0.0), Vec3::new(0.0, 0.0, -100.0), Vec3::Y);
        let frustum = camera.frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -100.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 100.0)));
    }

    #[test]
    fn test_view_distance_limits_frustum() {
        let camera = Camera { far: 500.0, ..Camera::look_at(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y) };
        assert!(camera.frustum().contains_point(Vec3::new(0.0, 0.0, -400.0)));
        assert!(!camera.frustum().contains_point(Vec3::new(0.0, 0.0, -600.0)));
    }
}
