//! Error types for mesh generation.

use crate::checkpoint::{CheckpointError, take_checkpoint_error};
use thiserror::Error;

/// Errors that can occur while building the generator or running it.
#[derive(Debug, Error)]
pub enum MeshGenError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Tensor error: {0}")]
    Tensor(candle_core::Error),

    #[error("Export error: {0}")]
    Export(#[from] meshgen_data::ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected {expected} views, got {found}")]
    InvalidViewCount { expected: usize, found: usize },

    #[error("View {index} is {width}x{height}, expected {expected}x{expected}")]
    InvalidImageSize {
        index: usize,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("Texture size must be positive")]
    InvalidTextureSize,

    #[error("Geometry extraction produced an empty mesh")]
    EmptyMesh,

    #[error("Geometry extractor used before initialization")]
    GeometryNotInitialized,

    #[error("Mesh extraction takes a single object, got a batch of {0}")]
    BatchSize(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Checkpoint errors raised while a layer reads its parameters come back
/// wrapped in a candle error; they are unwrapped into `Checkpoint`.
impl From<candle_core::Error> for MeshGenError {
    fn from(err: candle_core::Error) -> Self {
        match take_checkpoint_error(err) {
            Ok(err) => MeshGenError::Checkpoint(err),
            Err(err) => MeshGenError::Tensor(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshGenError>;
