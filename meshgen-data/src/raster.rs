//! Rasterization of mesh faces into texture space.
//!
//! For every texel covered by a face's UV triangle this records the 3D
//! surface position under it, which is what the texture field is queried
//! with when baking a texture map.

use crate::atlas::UvAtlas;
use glam::{Vec2, Vec3};
use tracing::debug;

/// Surface positions and coverage for every texel of a square texture.
#[derive(Debug, Clone)]
pub struct TexelPositions {
    resolution: u32,
    positions: Vec<Vec3>,
    mask: Vec<bool>,
}

impl TexelPositions {
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn is_covered(&self, x: u32, y: u32) -> bool {
        self.mask[self.index(x, y)]
    }

    pub fn covered_count(&self) -> usize {
        self.mask.iter().filter(|m| **m).count()
    }

    /// Covered texels as `(x, y, position)`, row by row.
    pub fn covered(&self) -> impl Iterator<Item = (u32, u32, Vec3)> + '_ {
        let res = self.resolution;
        self.mask
            .iter()
            .zip(&self.positions)
            .enumerate()
            .filter(|(_, (m, _))| **m)
            .map(move |(i, (_, p))| (i as u32 % res, i as u32 / res, *p))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.resolution as usize + x as usize
    }
}

/// Rasterize every face of a mesh into its atlas chart.
///
/// Texel `(x, y)` has its centre at `((x + 0.5) / res, (y + 0.5) / res)` in
/// UV space, so row 0 lies at v = 0. A face too small to contain any texel
/// centre still claims the texel under its centroid if that one is free.
pub fn rasterize_positions(
    vertices: &[Vec3],
    faces: &[[u32; 3]],
    atlas: &UvAtlas,
    resolution: u32,
) -> TexelPositions {
    let res = resolution as usize;
    let mut positions = vec![Vec3::ZERO; res * res];
    let mut mask = vec![false; res * res];
    let scale = resolution as f32;
    let mut starved = 0usize;
    if res == 0 {
        return TexelPositions {
            resolution,
            positions,
            mask,
        };
    }

    for (face_index, face) in faces.iter().enumerate() {
        let uv = atlas.face_uvs(face_index).map(|p| p * scale);
        let corners = face.map(|i| vertices[i as usize]);

        let area = edge(uv[0], uv[1], uv[2]);
        if area.abs() <= f32::EPSILON {
            continue;
        }

        let min = uv[0].min(uv[1]).min(uv[2]);
        let max = uv[0].max(uv[1]).max(uv[2]);
        let x_start = (min.x.floor().max(0.0)) as usize;
        let y_start = (min.y.floor().max(0.0)) as usize;
        let x_end = (max.x.ceil() as usize).min(res);
        let y_end = (max.y.ceil() as usize).min(res);

        let mut hit = false;
        for y in y_start..y_end {
            for x in x_start..x_end {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(uv[1], uv[2], p) / area;
                let w1 = edge(uv[2], uv[0], p) / area;
                let w2 = edge(uv[0], uv[1], p) / area;
                if w0 < -1e-6 || w1 < -1e-6 || w2 < -1e-6 {
                    continue;
                }
                let i = y * res + x;
                positions[i] = corners[0] * w0 + corners[1] * w1 + corners[2] * w2;
                mask[i] = true;
                hit = true;
            }
        }

        if !hit {
            starved += 1;
            let c = (uv[0] + uv[1] + uv[2]) / 3.0;
            let x = (c.x.max(0.0) as usize).min(res - 1);
            let y = (c.y.max(0.0) as usize).min(res - 1);
            let i = y * res + x;
            if !mask[i] {
                positions[i] = (corners[0] + corners[1] + corners[2]) / 3.0;
                mask[i] = true;
            }
        }
    }

    if starved > 0 {
        debug!(
            "{} of {} faces were smaller than a texel at resolution {}",
            starved,
            faces.len(),
            resolution
        );
    }

    TexelPositions {
        resolution,
        positions,
        mask,
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}
