//! Uniform buffer contents: the rotating model-view-projection transform.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Rotation speed of the quad in degrees per second.
pub const ROTATION_DEGREES_PER_SEC: f32 = 90.0;

/// Model, view, and projection matrices, laid out for std140.
///
/// Three column-major `mat4`s have no padding between them, so the Rust
/// layout matches the shader block byte for byte.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransformUbo {
    /// Model matrix: rotation around +Z by the elapsed time.
    pub model: Mat4,
    /// View matrix: fixed camera looking at the origin.
    pub view: Mat4,
    /// Projection matrix with the Vulkan Y-axis flip applied.
    pub proj: Mat4,
}

impl TransformUbo {
    /// Size of the uniform block in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Computes the transform for a given elapsed time and aspect ratio.
    ///
    /// The camera sits at (2, 2, 2) looking at the origin with +Z up. The
    /// projection's Y axis is negated because Vulkan clip space points Y
    /// down while glam's perspective assumes OpenGL conventions.
    pub fn spin(elapsed_secs: f32, aspect: f32) -> Self {
        let angle = elapsed_secs * ROTATION_DEGREES_PER_SEC.to_radians();
        let model = Mat4::from_rotation_z(angle);

        let view = Mat4::look_at_rh(Vec3::new(2.0, 2.0, 2.0), Vec3::ZERO, Vec3::Z);

        let mut proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_block_size_is_three_mat4s() {
        assert_eq!(TransformUbo::SIZE, 3 * 64);
    }

    #[test]
    fn test_model_is_identity_at_start() {
        let ubo = TransformUbo::spin(0.0, 1.0);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, EPS));
    }

    #[test]
    fn test_quarter_turn_after_one_second() {
        // 90 degrees per second rotates +X onto +Y after one second.
        let ubo = TransformUbo::spin(1.0, 1.0);
        let rotated = ubo.model * Vec4::X;
        assert!(rotated.abs_diff_eq(Vec4::Y, EPS), "got {rotated:?}");
    }

    #[test]
    fn test_full_turn_after_four_seconds() {
        let ubo = TransformUbo::spin(4.0, 1.0);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_projection_y_axis_is_flipped() {
        let ubo = TransformUbo::spin(0.0, 800.0 / 600.0);
        assert!(ubo.proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_view_moves_camera_away_from_origin() {
        let ubo = TransformUbo::spin(0.0, 1.0);
        let origin = ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // The origin ends up in front of the camera, at distance |(2,2,2)|.
        let expected_distance = (12.0f32).sqrt();
        assert!((origin.z + expected_distance).abs() < 1e-4, "got {origin:?}");
    }
}
