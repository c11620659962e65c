//! Uniform buffer object definitions for shaders.
//!
//! Must match the `UniformBufferObject` block at binding 0 of
//! `triangle.vert` exactly. `#[repr(C)]` with only `mat4` members gives the
//! std140 layout directly.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Degrees per second the quad spins around +Z.
pub const ROTATION_DEG_PER_SEC: f32 = 90.0;

const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y_DEG: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Model, view and projection matrices.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Transforms for `seconds` after startup at the given aspect ratio.
    pub fn at_time(seconds: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z((seconds * ROTATION_DEG_PER_SEC).to_radians());
        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        let mut proj = Mat4::perspective_rh(FOV_Y_DEG.to_radians(), aspect, Z_NEAR, Z_FAR);
        // Vulkan clip space has +Y pointing down.
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ubo_size() {
        // 3 Mat4 (3 * 64) = 192 bytes
        assert_eq!(UniformBufferObject::SIZE, 192);
    }

    #[test]
    fn test_ubo_alignment() {
        assert_eq!(std::mem::align_of::<UniformBufferObject>(), 16);
    }

    #[test]
    fn test_model_starts_at_identity() {
        let ubo = UniformBufferObject::at_time(0.0, 16.0 / 9.0);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_model_quarter_turn_after_one_second() {
        let ubo = UniformBufferObject::at_time(1.0, 1.0);
        let rotated = ubo.model.transform_point3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_projection_flips_y() {
        let aspect = 4.0 / 3.0;
        let ubo = UniformBufferObject::at_time(0.0, aspect);
        let unflipped = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
        assert_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(ubo.proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn test_view_looks_at_origin() {
        let ubo = UniformBufferObject::at_time(0.0, 1.0);
        let origin_in_view = ubo.view.transform_point3(Vec3::ZERO);
        // Right-handed view space looks down -Z.
        assert!(origin_in_view.x.abs() < 1e-5);
        assert!(origin_in_view.y.abs() < 1e-5);
        assert!(origin_in_view.z < 0.0);
    }

    #[test]
    fn test_ubo_bytes() {
        let ubo = UniformBufferObject::at_time(0.5, 1.0);
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), UniformBufferObject::SIZE);
    }
}
