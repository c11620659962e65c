//! The colored quad: vertex and index data plus its device-local buffers.

use std::sync::Arc;

use glam::Vec3;
use tracing::info;

use quad_rhi::RhiResult;
use quad_rhi::buffer::{Buffer, BufferUsage};
use quad_rhi::command::CommandPool;
use quad_rhi::device::Device;
use quad_rhi::vertex::Vertex;
use quad_rhi::vk;

/// Corners of the quad, counter-clockwise from bottom-left.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::new(0.0, 0.0, 1.0)),
    Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0)),
];

/// Two triangles sharing the 0-2 diagonal.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// GPU copies of [`QUAD_VERTICES`] and [`QUAD_INDICES`].
///
/// Immutable after upload; lives as long as the device.
pub struct QuadGeometry {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl QuadGeometry {
    /// Uploads the quad through staging buffers, blocking until the copies finish.
    pub fn upload(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            command_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let index_buffer = Buffer::new_device_local(
            device,
            command_pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&QUAD_INDICES),
        )?;

        info!(
            "Quad geometry uploaded: {} vertices, {} indices",
            QUAD_VERTICES.len(),
            QUAD_INDICES.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Index type matching [`QUAD_INDICES`].
    #[inline]
    pub fn index_type(&self) -> vk::IndexType {
        vk::IndexType::UINT32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_indices_in_range() {
        assert!(
            QUAD_INDICES
                .iter()
                .all(|&i| (i as usize) < QUAD_VERTICES.len())
        );
    }

    #[test]
    fn test_quad_triangles_wind_counter_clockwise() {
        for triangle in QUAD_INDICES.chunks(3) {
            let a = QUAD_VERTICES[triangle[0] as usize].position;
            let b = QUAD_VERTICES[triangle[1] as usize].position;
            let c = QUAD_VERTICES[triangle[2] as usize].position;
            let normal = (b - a).cross(c - a);
            assert!(normal.z > 0.0);
        }
    }

    #[test]
    fn test_quad_corner_colors() {
        assert_eq!(QUAD_VERTICES[0].color, Vec3::X);
        assert_eq!(QUAD_VERTICES[1].color, Vec3::Y);
        assert_eq!(QUAD_VERTICES[2].color, Vec3::Z);
        assert_eq!(QUAD_VERTICES[3].color, Vec3::ONE);
    }

    #[test]
    fn test_quad_byte_sizes() {
        assert_eq!(bytemuck::cast_slice::<_, u8>(&QUAD_VERTICES).len(), 4 * 24);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&QUAD_INDICES).len(), 6 * 4);
    }
}
