//! Meshgen Data Crate
//!
//! CPU-side mesh types and everything needed to turn an extracted surface
//! into files on disk: UV atlas packing, texel rasterization, texture
//! quantization and OBJ/MTL/PNG export. This crate knows nothing about
//! tensors or the network that produced the geometry.

pub mod atlas;
pub mod obj;
pub mod raster;
pub mod texture;
pub mod types;
pub mod views;

pub use atlas::UvAtlas;
pub use obj::{ExportError, write_colored_obj, write_mesh, write_textured_obj};
pub use raster::{TexelPositions, rasterize_positions};
pub use texture::TextureMap;
pub use types::{ColoredMesh, MeshOutput, TexturedMesh, Triangle};
pub use views::{ViewGridError, split_view_grid};
