//! Weighted dual surface extraction over a deformed voxel grid.
//!
//! Every cube the surface passes through contributes one vertex: the
//! beta-weighted mean of the zero crossings on its sign-changing edges, where
//! each crossing interpolates the alpha-scaled SDF values at the edge ends.
//! Every sign-changing grid edge shared by four cubes contributes a quad over
//! their vertices, split into triangles along the diagonal with the larger
//! gamma product.
//!
//! Negative SDF is inside. Triangles wind counter-clockwise seen from outside.

use super::grid::{CUBE_EDGES, VoxelGrid};
use glam::Vec3;
use tracing::debug;

/// Weights of one cube after normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeWeights {
    /// Per-edge weight of its crossing in the dual vertex.
    pub beta: [f32; 12],
    /// Per-corner scale of the SDF when locating crossings.
    pub alpha: [f32; 8],
    /// Preference for splitting quads through this cube's vertex.
    pub gamma: f32,
}

const WEIGHT_SCALE: f32 = 0.99;

impl CubeWeights {
    /// Plain surface nets: every crossing counts the same, no SDF scaling.
    pub fn uniform() -> Self {
        Self {
            beta: [1.0; 12],
            alpha: [1.0; 8],
            gamma: 0.5,
        }
    }

    /// Normalize 21 raw network outputs: 12 betas, 8 alphas, then gamma.
    pub fn from_raw(raw: &[f32]) -> Self {
        let squash = |x: f32| x.tanh() * WEIGHT_SCALE + 1.0;
        let mut beta = [0.0; 12];
        let mut alpha = [0.0; 8];
        for (b, r) in beta.iter_mut().zip(&raw[..12]) {
            *b = squash(*r);
        }
        for (a, r) in alpha.iter_mut().zip(&raw[12..20]) {
            *a = squash(*r);
        }
        let sigmoid = 1.0 / (1.0 + (-raw[20]).exp());
        Self {
            beta,
            alpha,
            gamma: sigmoid * WEIGHT_SCALE + (1.0 - WEIGHT_SCALE) / 2.0,
        }
    }
}

/// An indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceMesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
}

impl SurfaceMesh {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

fn inside(sdf: f32) -> bool {
    sdf < 0.0
}

/// Cubes whose corners are neither all inside nor all outside, ascending.
pub fn surface_cubes(grid: &VoxelGrid, sdf: &[f32]) -> Vec<usize> {
    (0..grid.cube_count())
        .filter(|&cube| {
            let occupied = grid
                .cube_corners(cube)
                .iter()
                .filter(|&&v| inside(sdf[v]))
                .count();
            occupied > 0 && occupied < 8
        })
        .collect()
}

/// Make sure a surface exists.
///
/// When the SDF inside the outermost layer has no sign change, the centre
/// vertex is set to `1 - min` and the two outer layers to `-1 - max`, so the
/// two regions end up on opposite sides of the level set. Returns whether the
/// field was changed.
pub fn fix_empty_shape(grid: &VoxelGrid, sdf: &mut [f32]) -> bool {
    let (mut any_pos, mut any_neg) = (false, false);
    for (v, &s) in sdf.iter().enumerate() {
        if grid.is_interior(v) {
            any_pos |= s > 0.0;
            any_neg |= s < 0.0;
        }
    }
    if any_pos && any_neg {
        return false;
    }

    let min = sdf.iter().copied().fold(f32::INFINITY, f32::min);
    let max = sdf.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    sdf[grid.center_index()] = 1.0 - min;
    for (v, s) in sdf.iter_mut().enumerate() {
        if grid.is_boundary(v) {
            *s = -1.0 - max;
        }
    }
    debug!("SDF had no surface; seeded one at the grid centre");
    true
}

/// Zero crossing between `xa` and `xb` of the alpha-scaled field.
fn crossing(xa: Vec3, wa: f32, xb: Vec3, wb: f32) -> Vec3 {
    (xa * wb - xb * wa) / (wb - wa)
}

/// Extract the surface.
///
/// `positions` and `sdf` are per grid vertex; `cubes` lists the surface
/// cubes (see [`surface_cubes`]) and `weights` holds one entry per listed
/// cube.
pub fn extract_surface(
    grid: &VoxelGrid,
    positions: &[Vec3],
    sdf: &[f32],
    cubes: &[usize],
    weights: &[CubeWeights],
) -> SurfaceMesh {
    const NONE: u32 = u32::MAX;

    // Surface cube index -> slot in `cubes`.
    let mut slot = vec![NONE; grid.cube_count()];
    for (i, &cube) in cubes.iter().enumerate() {
        slot[cube] = i as u32;
    }

    let dual: Vec<Vec3> = cubes
        .iter()
        .zip(weights)
        .map(|(&cube, w)| {
            let corners = grid.cube_corners(cube);
            let mut sum = Vec3::ZERO;
            let mut total = 0.0;
            for (e, [a, b]) in CUBE_EDGES.iter().enumerate() {
                let (va, vb) = (corners[*a], corners[*b]);
                if inside(sdf[va]) == inside(sdf[vb]) {
                    continue;
                }
                let p = crossing(
                    positions[va],
                    sdf[va] * w.alpha[*a],
                    positions[vb],
                    sdf[vb] * w.alpha[*b],
                );
                sum += p * w.beta[e];
                total += w.beta[e];
            }
            sum / total
        })
        .collect();

    let r = grid.resolution();
    let mut quads: Vec<[u32; 4]> = Vec::new();
    for a in 0..3 {
        let (b, c) = ((a + 1) % 3, (a + 2) % 3);
        for v in 0..grid.vertex_count() {
            let coords = grid.vertex_coords(v);
            if coords[a] >= r {
                continue;
            }
            // Only edges with all four neighbouring cubes in the grid.
            if coords[b] == 0 || coords[b] >= r || coords[c] == 0 || coords[c] >= r {
                continue;
            }
            let mut next = coords;
            next[a] += 1;
            let u = grid.vertex_index(next[0], next[1], next[2]);
            if inside(sdf[v]) == inside(sdf[u]) {
                continue;
            }

            // Counter-clockwise around +a.
            let quad = [(1, 1), (0, 1), (0, 0), (1, 0)].map(|(db, dc)| {
                let mut cube = coords;
                cube[b] -= db;
                cube[c] -= dc;
                slot[grid.cube_index(cube[0], cube[1], cube[2])]
            });
            if quad.contains(&NONE) {
                continue;
            }
            // Face the outside: +a when the edge leaves the shape going up.
            if inside(sdf[v]) {
                quads.push(quad);
            } else {
                quads.push([quad[3], quad[2], quad[1], quad[0]]);
            }
        }
    }

    let mut faces = Vec::with_capacity(quads.len() * 2);
    for q in &quads {
        let g = q.map(|i| weights[i as usize].gamma);
        if g[0] * g[2] > g[1] * g[3] {
            faces.push([q[0], q[1], q[2]]);
            faces.push([q[0], q[2], q[3]]);
        } else {
            faces.push([q[0], q[1], q[3]]);
            faces.push([q[3], q[1], q[2]]);
        }
    }

    compact(dual, faces)
}

/// Drop vertices no face references and renumber the rest.
fn compact(vertices: Vec<Vec3>, faces: Vec<[u32; 3]>) -> SurfaceMesh {
    let mut remap = vec![u32::MAX; vertices.len()];
    let mut kept = Vec::new();
    let faces = faces
        .into_iter()
        .map(|face| {
            face.map(|v| {
                let slot = &mut remap[v as usize];
                if *slot == u32::MAX {
                    *slot = kept.len() as u32;
                    kept.push(vertices[v as usize]);
                }
                *slot
            })
        })
        .collect();
    SurfaceMesh {
        vertices: kept,
        faces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_sdf(grid: &VoxelGrid, radius: f32) -> (Vec<Vec3>, Vec<f32>) {
        let positions = grid.vertices();
        let sdf = positions.iter().map(|p| p.length() - radius).collect();
        (positions, sdf)
    }

    fn signed_volume(mesh: &SurfaceMesh) -> f32 {
        mesh.faces
            .iter()
            .map(|f| {
                let [a, b, c] = f.map(|i| mesh.vertices[i as usize]);
                a.dot(b.cross(c)) / 6.0
            })
            .sum()
    }

    #[test]
    fn test_weight_normalization_ranges() {
        let mut raw = [0.0f32; 21];
        raw[0] = 100.0;
        raw[12] = -100.0;
        raw[20] = 100.0;
        let w = CubeWeights::from_raw(&raw);
        assert!((w.beta[0] - 1.99).abs() < 1e-5);
        assert!((w.beta[1] - 1.0).abs() < 1e-6);
        assert!((w.alpha[0] - 0.01).abs() < 1e-5);
        assert!((w.gamma - 0.995).abs() < 1e-5);
        assert!((CubeWeights::from_raw(&[0.0; 21]).gamma - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_is_closed_and_outward() {
        let grid = VoxelGrid::new(16, 2.0);
        let (positions, sdf) = sphere_sdf(&grid, 0.6);
        let cubes = surface_cubes(&grid, &sdf);
        let weights = vec![CubeWeights::uniform(); cubes.len()];
        let mesh = extract_surface(&grid, &positions, &sdf, &cubes, &weights);

        assert!(!mesh.is_empty());
        for v in &mesh.vertices {
            assert!((v.length() - 0.6).abs() < 0.05, "vertex {v} off the sphere");
        }

        let volume = signed_volume(&mesh);
        let expected = 4.0 / 3.0 * std::f32::consts::PI * 0.6f32.powi(3);
        assert!(volume > 0.0, "faces point inward");
        assert!((volume - expected).abs() / expected < 0.1);

        // Closed two-manifold: every edge is used once in each direction.
        let mut edges = std::collections::HashMap::new();
        for f in &mesh.faces {
            for i in 0..3 {
                *edges.entry((f[i], f[(i + 1) % 3])).or_insert(0) += 1;
            }
        }
        for (&(a, b), &n) in &edges {
            assert_eq!(n, 1);
            assert_eq!(edges.get(&(b, a)), Some(&1));
        }
    }

    #[test]
    fn test_inverted_field_flips_orientation() {
        let grid = VoxelGrid::new(12, 2.0);
        let (positions, sdf) = sphere_sdf(&grid, 0.5);
        let flipped: Vec<f32> = sdf.iter().map(|s| -s).collect();
        let cubes = surface_cubes(&grid, &flipped);
        let weights = vec![CubeWeights::uniform(); cubes.len()];
        let mesh = extract_surface(&grid, &positions, &flipped, &cubes, &weights);
        assert!(signed_volume(&mesh) < 0.0);
    }

    #[test]
    fn test_alpha_shifts_crossing() {
        let xa = Vec3::ZERO;
        let xb = Vec3::X;
        let mid = crossing(xa, -1.0, xb, 1.0);
        assert!((mid.x - 0.5).abs() < 1e-6);
        // Scaling the inside end pulls the crossing away from it.
        let shifted = crossing(xa, -1.0 * 1.5, xb, 1.0);
        assert!(shifted.x > 0.5);
    }

    #[test]
    fn test_empty_field_gets_a_surface() {
        let grid = VoxelGrid::new(8, 2.0);
        let mut sdf = vec![0.3f32; grid.vertex_count()];
        assert!(fix_empty_shape(&grid, &mut sdf));
        // Seeded values replace the field rather than offsetting it.
        assert!((sdf[grid.center_index()] - 0.7).abs() < 1e-6);
        assert!((sdf[0] - (-1.3)).abs() < 1e-6);
        assert_eq!(sdf[grid.vertex_index(3, 3, 3)], 0.3);
        assert!(!surface_cubes(&grid, &sdf).is_empty());

        let mut sphere = sphere_sdf(&grid, 0.5).1;
        let before = sphere.clone();
        assert!(!fix_empty_shape(&grid, &mut sphere));
        assert_eq!(sphere, before);
    }
}
