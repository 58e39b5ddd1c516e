//! UV atlas generation.
//!
//! Every face gets its own chart. Faces are packed in pairs into the cells
//! of a regular grid: the even face takes the lower-left half of a cell, the
//! odd face the upper-right half, each inset by a small gutter so bilinear
//! lookups do not mix neighbouring charts.

use glam::Vec2;
use tracing::debug;

/// Per-face texture coordinates laid out over the unit square.
#[derive(Debug, Clone)]
pub struct UvAtlas {
    /// Three texture coordinates per face, in face order.
    pub uvs: Vec<Vec2>,
    /// Indices into `uvs`, parallel to the mesh faces.
    pub uv_faces: Vec<[u32; 3]>,
}

impl UvAtlas {
    /// Pack `face_count` faces into an atlas sampled at `resolution` texels.
    pub fn pack(face_count: usize, resolution: u32) -> Self {
        let cells = face_count.div_ceil(2).max(1);
        let cells_per_row = (cells as f64).sqrt().ceil() as u32;
        let cell = 1.0 / cells_per_row as f32;
        // Half a texel, but never more than an eighth of the cell.
        let gutter = (0.5 / resolution.max(1) as f32).min(cell / 8.0);

        let mut uvs = Vec::with_capacity(face_count * 3);
        let mut uv_faces = Vec::with_capacity(face_count);

        for face in 0..face_count {
            let slot = (face / 2) as u32;
            let x0 = (slot % cells_per_row) as f32 * cell;
            let y0 = (slot / cells_per_row) as f32 * cell;
            let (x1, y1) = (x0 + cell, y0 + cell);

            let corners = if face % 2 == 0 {
                [
                    Vec2::new(x0 + gutter, y0 + gutter),
                    Vec2::new(x1 - 2.0 * gutter, y0 + gutter),
                    Vec2::new(x0 + gutter, y1 - 2.0 * gutter),
                ]
            } else {
                [
                    Vec2::new(x1 - gutter, y1 - gutter),
                    Vec2::new(x0 + 2.0 * gutter, y1 - gutter),
                    Vec2::new(x1 - gutter, y0 + 2.0 * gutter),
                ]
            };

            let base = uvs.len() as u32;
            uvs.extend_from_slice(&corners);
            uv_faces.push([base, base + 1, base + 2]);
        }

        debug!(
            "Packed {} faces into a {}x{} cell atlas",
            face_count, cells_per_row, cells_per_row
        );

        Self { uvs, uv_faces }
    }

    /// Texture coordinates of one face.
    pub fn face_uvs(&self, face: usize) -> [Vec2; 3] {
        let [a, b, c] = self.uv_faces[face];
        [
            self.uvs[a as usize],
            self.uvs[b as usize],
            self.uvs[c as usize],
        ]
    }
}
