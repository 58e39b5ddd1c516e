//! Core mesh types produced by the generator.
//!
//! These are CPU-side representations; tensors never leave meshgen-model.

use crate::texture::TextureMap;
use glam::{Vec2, Vec3};

/// A triangle with three corner positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex position.
    pub v0: Vec3,
    /// Second vertex position.
    pub v1: Vec3,
    /// Third vertex position.
    pub v2: Vec3,
}

impl Triangle {
    /// Create a new triangle from three vertices.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Signed volume of the tetrahedron spanned with the origin.
    ///
    /// Summed over a closed, outward-facing mesh this gives its enclosed volume.
    pub fn signed_volume(&self) -> f32 {
        self.v0.dot(self.v1.cross(self.v2)) / 6.0
    }
}

/// Mesh with a UV atlas and a baked texture map.
#[derive(Debug, Clone)]
pub struct TexturedMesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
    /// Texture coordinates in [0, 1], v pointing up.
    pub uvs: Vec<Vec2>,
    /// Per-face indices into `uvs`, parallel to `faces`.
    pub uv_faces: Vec<[u32; 3]>,
    pub texture: TextureMap,
}

/// Mesh with one RGB color per vertex.
#[derive(Debug, Clone)]
pub struct ColoredMesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
    pub colors: Vec<[u8; 3]>,
}

/// Result of a mesh extraction, ready for export.
#[derive(Debug, Clone)]
pub enum MeshOutput {
    Textured(TexturedMesh),
    Colored(ColoredMesh),
}

impl MeshOutput {
    pub fn vertices(&self) -> &[Vec3] {
        match self {
            MeshOutput::Textured(mesh) => &mesh.vertices,
            MeshOutput::Colored(mesh) => &mesh.vertices,
        }
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        match self {
            MeshOutput::Textured(mesh) => &mesh.faces,
            MeshOutput::Colored(mesh) => &mesh.faces,
        }
    }

    /// Iterate over the mesh faces as positioned triangles.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        let vertices = self.vertices();
        self.faces().iter().map(move |f| {
            Triangle::new(
                vertices[f[0] as usize],
                vertices[f[1] as usize],
                vertices[f[2] as usize],
            )
        })
    }

    /// Total signed volume; positive for closed meshes with outward winding.
    pub fn signed_volume(&self) -> f32 {
        self.triangles().map(|t| t.signed_volume()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tetrahedron() -> MeshOutput {
        MeshOutput::Colored(ColoredMesh {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            faces: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
            colors: vec![[255, 255, 255]; 4],
        })
    }

    #[test]
    fn test_triangle_volume_sign_follows_winding() {
        let (a, b, c) = (
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert!((Triangle::new(a, b, c).signed_volume() - 1.0 / 6.0).abs() < 1e-6);
        assert!((Triangle::new(a, c, b).signed_volume() + 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_tetrahedron_volume_is_positive_for_outward_winding() {
        let mesh = unit_tetrahedron();
        assert!((mesh.signed_volume() - 1.0 / 6.0).abs() < 1e-6);
        assert_eq!(mesh.triangles().count(), 4);
    }
}
