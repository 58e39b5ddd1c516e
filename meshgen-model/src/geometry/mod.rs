//! Surface extraction from a signed distance field on a deformable grid
//!
//! - [`grid`]: vertex and cube layout of the voxel grid
//! - [`dual`]: weighted dual contouring and the empty-shape fix

pub mod dual;
pub mod grid;

pub use dual::{CubeWeights, SurfaceMesh, extract_surface, fix_empty_shape, surface_cubes};
pub use grid::VoxelGrid;
