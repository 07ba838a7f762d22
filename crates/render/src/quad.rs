//! Geometry of the textured quad.

use glam::{Vec2, Vec3};
use spinquad_rhi::vertex::QuadVertex;

/// The four corners of a unit quad centered at the origin.
///
/// Colors fade between the corners; UVs map the full texture across the
/// quad.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex::new(
        Vec2::new(-0.5, -0.5),
        Vec3::new(1.0, 0.0, 0.0),
        Vec2::new(1.0, 0.0),
    ),
    QuadVertex::new(
        Vec2::new(0.5, -0.5),
        Vec3::new(0.0, 1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ),
    QuadVertex::new(
        Vec2::new(0.5, 0.5),
        Vec3::new(0.0, 0.0, 1.0),
        Vec2::new(0.0, 1.0),
    ),
    QuadVertex::new(
        Vec2::new(-0.5, 0.5),
        Vec3::new(1.0, 1.0, 1.0),
        Vec2::new(1.0, 1.0),
    ),
];

/// Two triangles sharing the quad's diagonal.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_address_valid_vertices() {
        for &index in &QUAD_INDICES {
            assert!((index as usize) < QUAD_VERTICES.len());
        }
    }

    #[test]
    fn test_index_count_is_two_triangles() {
        assert_eq!(QUAD_INDICES.len(), 6);
    }

    #[test]
    fn test_every_vertex_is_referenced() {
        for i in 0..QUAD_VERTICES.len() as u16 {
            assert!(QUAD_INDICES.contains(&i), "vertex {i} unused");
        }
    }

    #[test]
    fn test_triangles_share_the_diagonal() {
        let first: &[u16] = &QUAD_INDICES[..3];
        let second: &[u16] = &QUAD_INDICES[3..];
        let shared: Vec<u16> = first
            .iter()
            .copied()
            .filter(|i| second.contains(i))
            .collect();
        assert_eq!(shared.len(), 2);
    }
}
