// Math utilities for table-scene

use glam::{Mat3, Mat4, Vec3};

/// Fixed perspective camera looking at the scene origin.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(8.0, 5.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 60.0,
            near: 1.0,
            far: 100.0,
        }
    }
}

impl Camera {
    /// World-to-eye transform.
    #[cfg(test)]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Eye-to-clip transform with a [0, 1] depth range.
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        )
    }
}

/// Width over height, treating a collapsed viewport as square.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    width as f32 / height as f32
}

/// Inverse-transpose of the upper 3x3 block of `model_view`.
///
/// Keeps normals perpendicular to their surfaces under non-uniform scale.
/// The block must be invertible: every scale factor applied to a lit object
/// has to be non-zero, otherwise the result is meaningless.
pub fn normal_matrix(model_view: &Mat4) -> Mat3 {
    Mat3::from_mat4(*model_view).inverse().transpose()
}
