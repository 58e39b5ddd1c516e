//! Meshgen Model Crate
//!
//! Reconstructs a textured mesh from six posed views of an object. The
//! network encodes the views with a camera-conditioned ViT, decodes the
//! tokens into a triplane, and a dual-contouring extractor turns the SDF the
//! triplane describes into a surface.
//!
//! ## Modules
//!
//! - [`generator`]: [`MeshGenerator`], the one-call entry point
//! - [`checkpoint`]: checkpoint download, caching and strict loading
//! - [`network`]: encoder, triplane transformer and decoder
//! - [`synthesizer`]: triplane decoding into geometry and colors
//! - [`geometry`]: voxel grid and dual contouring
//! - [`camera`]: the fixed input camera rig
//! - [`config`]: serde configuration with large-model defaults

pub mod camera;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod generator;
pub mod geometry;
pub mod network;
pub mod synthesizer;
pub mod triplane;

pub use camera::{InputCameras, NUM_VIEWS};
pub use checkpoint::{CheckpointError, CheckpointFetcher, CheckpointTensors, HubFetcher};
pub use config::{CheckpointConfig, DevicePreference, GeneratorConfig, ModelConfig};
pub use error::{MeshGenError, Result};
pub use generator::{IMAGE_SIZE, MeshExporter, MeshGenerator, ObjExporter, ReconstructionModel};
pub use network::{ExtractOptions, LrmMesh};
