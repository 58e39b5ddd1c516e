//! Checkpoint acquisition and strict parameter loading
//!
//! - [`store`]: local cache path, hub download on a miss
//! - [`state_dict`]: reading checkpoint files and selecting the generator's namespace
//! - [`weights`]: a `VarBuilder` backend that tracks which parameters were used

pub mod state_dict;
pub mod store;
pub mod weights;

pub use state_dict::{read_state_dict, strip_prefix};
pub use store::{CheckpointFetcher, CheckpointStore, HubFetcher};
pub use weights::{CheckpointTensors, take_checkpoint_error};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching or loading a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: candle_core::Error,
    },

    #[error("No parameters start with prefix {0:?}")]
    NoMatchingPrefix(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Unexpected parameters: {}", .0.join(", "))]
    UnexpectedParameters(Vec<String>),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
