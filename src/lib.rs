//! Meshgen
//!
//! Six-view image to textured mesh reconstruction. This crate re-exports the
//! workspace members so demos and downstream users need a single dependency.

pub use meshgen_data as data;
pub use meshgen_model as model;

pub use meshgen_data::{MeshOutput, split_view_grid};
pub use meshgen_model::{
    DevicePreference, GeneratorConfig, IMAGE_SIZE, MeshGenError, MeshGenerator, NUM_VIEWS,
};
