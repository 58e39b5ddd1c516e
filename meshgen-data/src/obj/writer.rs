//! OBJ, MTL and texture writers

use crate::types::{ColoredMesh, MeshOutput, TexturedMesh};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the single material written alongside textured meshes.
const MATERIAL_NAME: &str = "material_0";

/// Errors that can occur while exporting a mesh.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Texture encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Output path has no file name: {0}")]
    InvalidPath(PathBuf),

    #[error("Mesh data is inconsistent: {0}")]
    Inconsistent(String),
}

/// Write any mesh output to `path`, picking the matching format.
pub fn write_mesh(mesh: &MeshOutput, path: &Path) -> Result<(), ExportError> {
    match mesh {
        MeshOutput::Textured(mesh) => write_textured_obj(mesh, path),
        MeshOutput::Colored(mesh) => write_colored_obj(mesh, path),
    }
}

/// Write a textured mesh as `<stem>.obj`, `<stem>.mtl` and `<stem>.png`.
///
/// The MTL and PNG files are placed next to `path` and share its stem.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn write_textured_obj(mesh: &TexturedMesh, path: &Path) -> Result<(), ExportError> {
    if mesh.faces.len() != mesh.uv_faces.len() {
        return Err(ExportError::Inconsistent(format!(
            "{} faces but {} texture faces",
            mesh.faces.len(),
            mesh.uv_faces.len()
        )));
    }

    let (dir, stem) = split_output_path(path)?;
    let mtl_path = dir.join(format!("{stem}.mtl"));
    let png_path = dir.join(format!("{stem}.png"));

    let mut mtl = BufWriter::new(File::create(&mtl_path)?);
    writeln!(mtl, "newmtl {MATERIAL_NAME}")?;
    writeln!(mtl, "Kd 1 1 1")?;
    writeln!(mtl, "Ka 0 0 0")?;
    writeln!(mtl, "Ks 0.4 0.4 0.4")?;
    writeln!(mtl, "Ns 10")?;
    writeln!(mtl, "illum 2")?;
    writeln!(mtl, "map_Kd {stem}.png")?;
    mtl.flush()?;

    let mut obj = BufWriter::new(File::create(path)?);
    writeln!(obj, "mtllib {stem}.mtl")?;
    for v in &mesh.vertices {
        writeln!(obj, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z)?;
    }
    for uv in &mesh.uvs {
        writeln!(obj, "vt {:.6} {:.6}", uv.x, uv.y)?;
    }
    writeln!(obj, "usemtl {MATERIAL_NAME}")?;
    for (f, t) in mesh.faces.iter().zip(&mesh.uv_faces) {
        writeln!(
            obj,
            "f {}/{} {}/{} {}/{}",
            f[0] + 1,
            t[0] + 1,
            f[1] + 1,
            t[1] + 1,
            f[2] + 1,
            t[2] + 1
        )?;
    }
    obj.flush()?;

    debug!(
        "Encoding {}x{} texture to {}",
        mesh.texture.width(),
        mesh.texture.height(),
        png_path.display()
    );
    mesh.texture.to_rgb_image().save(&png_path)?;

    info!(
        "Wrote textured mesh: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(())
}

/// Write a vertex-colored mesh as a single OBJ file.
///
/// Vertices are mirrored along z and faces reversed so the result keeps its
/// outward winding, matching the textured export's viewer orientation.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn write_colored_obj(mesh: &ColoredMesh, path: &Path) -> Result<(), ExportError> {
    if mesh.vertices.len() != mesh.colors.len() {
        return Err(ExportError::Inconsistent(format!(
            "{} vertices but {} colors",
            mesh.vertices.len(),
            mesh.colors.len()
        )));
    }
    split_output_path(path)?;

    let mut obj = BufWriter::new(File::create(path)?);
    for (v, c) in mesh.vertices.iter().zip(&mesh.colors) {
        writeln!(
            obj,
            "v {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            v.x,
            v.y,
            -v.z,
            c[0] as f32 / 255.0,
            c[1] as f32 / 255.0,
            c[2] as f32 / 255.0
        )?;
    }
    for f in &mesh.faces {
        writeln!(obj, "f {} {} {}", f[2] + 1, f[1] + 1, f[0] + 1)?;
    }
    obj.flush()?;

    info!(
        "Wrote vertex-colored mesh: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(())
}

/// Split an output path into its (created) parent directory and file stem.
fn split_output_path(path: &Path) -> Result<(PathBuf, String), ExportError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ExportError::InvalidPath(path.to_path_buf()))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    Ok((dir, stem))
}
