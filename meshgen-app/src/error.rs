//! Error types for the command line front end.

use meshgen_data::ViewGridError;
use meshgen_model::MeshGenError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing or running a generation job.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Generation(#[from] MeshGenError),

    #[error("Failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("View grid error: {0}")]
    ViewGrid(#[from] ViewGridError),

    #[error("No input views given")]
    MissingViews,
}
