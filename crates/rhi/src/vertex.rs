//! Vertex formats and their Vulkan input descriptions.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex of the textured quad: 2D position, vertex color, and UV.
///
/// Layout matches the vertex shader inputs at locations 0..2.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Position in the quad's local XY plane.
    pub position: Vec2,
    /// Per-vertex color, multiplied with the texture sample.
    pub color: Vec3,
    /// Texture coordinate.
    pub tex_coord: Vec2,
}

impl QuadVertex {
    /// Creates a vertex.
    pub const fn new(position: Vec2, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Returns the vertex buffer binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Returns the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(std::mem::offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Self, color) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(std::mem::offset_of!(Self, tex_coord) as u32),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 28);
        assert_eq!(QuadVertex::binding_description().stride, 28);
    }

    #[test]
    fn test_attribute_offsets() {
        let attrs = QuadVertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(attrs[2].offset, 20);
    }

    #[test]
    fn test_attribute_formats() {
        let attrs = QuadVertex::attribute_descriptions();
        assert_eq!(attrs[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_attribute_locations_are_sequential() {
        let attrs = QuadVertex::attribute_descriptions();
        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, i as u32);
            assert_eq!(attr.binding, 0);
        }
    }
}
