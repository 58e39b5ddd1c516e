//! Regular voxel grid the surface is extracted from.

use glam::Vec3;

/// Corner offsets of a cube, in the order cube-local corner ids refer to.
pub const CUBE_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// The twelve cube edges as pairs of local corner ids.
pub const CUBE_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 5],
    [4, 5],
    [0, 4],
    [2, 3],
    [3, 7],
    [6, 7],
    [2, 6],
    [2, 0],
    [3, 1],
    [7, 5],
    [6, 4],
];

/// `res`³ cubes sharing `(res + 1)`³ vertices, centred on the origin with
/// side length `scale`.
///
/// Vertex `(i, j, k)` sits at x index `i`, y index `j`, z index `k` and is
/// stored at `i * (res + 1)² + j * (res + 1) + k`. Cubes are numbered the same
/// way over `res`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelGrid {
    res: usize,
    scale: f32,
}

impl VoxelGrid {
    pub fn new(res: usize, scale: f32) -> Self {
        Self { res, scale }
    }

    pub fn resolution(&self) -> usize {
        self.res
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Vertices along one axis.
    pub fn side(&self) -> usize {
        self.res + 1
    }

    pub fn vertex_count(&self) -> usize {
        self.side().pow(3)
    }

    pub fn cube_count(&self) -> usize {
        self.res.pow(3)
    }

    pub fn vertex_index(&self, i: usize, j: usize, k: usize) -> usize {
        let s = self.side();
        (i * s + j) * s + k
    }

    pub fn vertex_coords(&self, index: usize) -> [usize; 3] {
        let s = self.side();
        [index / (s * s), (index / s) % s, index % s]
    }

    pub fn cube_index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.res + j) * self.res + k
    }

    pub fn cube_coords(&self, index: usize) -> [usize; 3] {
        let r = self.res;
        [index / (r * r), (index / r) % r, index % r]
    }

    /// Rest position of a vertex.
    pub fn vertex_position(&self, index: usize) -> Vec3 {
        let [i, j, k] = self.vertex_coords(index);
        let r = self.res as f32;
        Vec3::new(i as f32 / r - 0.5, j as f32 / r - 0.5, k as f32 / r - 0.5) * self.scale
    }

    /// Rest positions of every vertex, in index order.
    pub fn vertices(&self) -> Vec<Vec3> {
        (0..self.vertex_count()).map(|v| self.vertex_position(v)).collect()
    }

    /// Vertex indices of a cube's eight corners.
    pub fn cube_corners(&self, cube: usize) -> [usize; 8] {
        let [i, j, k] = self.cube_coords(cube);
        CUBE_CORNERS.map(|[di, dj, dk]| self.vertex_index(i + di, j + dj, k + dk))
    }

    /// The vertex just past the middle of the grid.
    pub fn center_index(&self) -> usize {
        let c = self.res / 2 + 1;
        self.vertex_index(c, c, c)
    }

    /// Whether a vertex lies in the two outermost layers on any axis.
    pub fn is_boundary(&self, index: usize) -> bool {
        let last = self.res;
        self.vertex_coords(index)
            .iter()
            .any(|&c| c < 2 || c + 1 >= last)
    }

    /// Whether a vertex lies strictly inside the outermost layer.
    pub fn is_interior(&self, index: usize) -> bool {
        self.vertex_coords(index)
            .iter()
            .all(|&c| c >= 1 && c < self.res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_extent() {
        let grid = VoxelGrid::new(4, 2.1);
        assert_eq!(grid.vertex_count(), 125);
        assert_eq!(grid.cube_count(), 64);
        let vertices = grid.vertices();
        assert!((vertices[0] - Vec3::splat(-1.05)).length() < 1e-6);
        assert!((vertices[124] - Vec3::splat(1.05)).length() < 1e-6);
        // x varies slowest.
        assert!((vertices[25].x - (-1.05 + 2.1 / 4.0)).abs() < 1e-6);
        assert_eq!(vertices[25].z, vertices[0].z);
    }

    #[test]
    fn test_index_round_trip() {
        let grid = VoxelGrid::new(5, 1.0);
        for index in [0, 7, 100, grid.vertex_count() - 1] {
            let [i, j, k] = grid.vertex_coords(index);
            assert_eq!(grid.vertex_index(i, j, k), index);
        }
        let [i, j, k] = grid.cube_coords(37);
        assert_eq!(grid.cube_index(i, j, k), 37);
    }

    #[test]
    fn test_cube_corners_follow_offsets() {
        let grid = VoxelGrid::new(3, 1.0);
        let corners = grid.cube_corners(grid.cube_index(1, 2, 0));
        assert_eq!(corners[0], grid.vertex_index(1, 2, 0));
        assert_eq!(corners[1], grid.vertex_index(2, 2, 0));
        assert_eq!(corners[2], grid.vertex_index(1, 3, 0));
        assert_eq!(corners[7], grid.vertex_index(2, 3, 1));
        for [a, b] in CUBE_EDGES {
            let pa = grid.vertex_position(corners[a]);
            let pb = grid.vertex_position(corners[b]);
            assert!(((pa - pb).length() - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_center_and_boundary() {
        let grid = VoxelGrid::new(8, 1.0);
        assert_eq!(grid.vertex_coords(grid.center_index()), [5, 5, 5]);
        assert!(!grid.is_boundary(grid.center_index()));
        assert!(grid.is_boundary(grid.vertex_index(1, 4, 4)));
        assert!(grid.is_boundary(grid.vertex_index(4, 7, 4)));
        assert!(!grid.is_boundary(grid.vertex_index(2, 6, 4)));
        assert!(grid.is_interior(grid.vertex_index(1, 7, 1)));
        assert!(!grid.is_interior(grid.vertex_index(0, 4, 4)));
    }
}
