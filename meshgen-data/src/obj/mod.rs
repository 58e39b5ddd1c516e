//! Wavefront OBJ export

mod writer;

pub use writer::{ExportError, write_colored_obj, write_mesh, write_textured_obj};
