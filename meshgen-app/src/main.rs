//! Meshgen Application
//!
//! Command line front end: reads six views (as separate files or one tiled
//! grid), reconstructs a mesh and writes it as OBJ with material and texture.

mod app;
mod error;

use app::{AppBuilder, LoggingConfig, ViewSource};
use clap::Parser;
use error::AppError;
use meshgen_model::{DevicePreference, GeneratorConfig};
use std::path::PathBuf;

/// Meshgen - Six-View Image to Textured Mesh
#[derive(Parser, Debug)]
#[command(name = "meshgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The six view images, in camera order
    #[arg(
        long,
        num_args = 6,
        value_name = "IMAGE",
        conflicts_with = "grid",
        required_unless_present = "grid"
    )]
    views: Vec<PathBuf>,

    /// One image holding all six views tiled in 3 rows by 2 columns
    #[arg(long, value_name = "IMAGE")]
    grid: Option<PathBuf>,

    /// Output OBJ path; the MTL and PNG are written next to it
    #[arg(short, long, default_value = "mesh.obj")]
    output: PathBuf,

    /// Texture map resolution
    #[arg(long, default_value_t = 1024)]
    texture_size: u32,

    /// JSON generator configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the cached checkpoint
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Run on the CPU even if a GPU is available
    #[arg(long)]
    cpu: bool,

    /// Export per-vertex colors instead of a texture map
    #[arg(long)]
    vertex_colors: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn build(args: Args) -> Result<AppBuilder, AppError> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::from_json_file(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(dir) = args.models_dir {
        config.checkpoint.models_dir = Some(dir);
    }
    if args.cpu {
        config.device = DevicePreference::Cpu;
    }
    if args.vertex_colors {
        config.export_texture_map = false;
    }

    let views = match args.grid {
        Some(grid) => ViewSource::Grid(grid),
        None => ViewSource::Files(args.views),
    };

    Ok(AppBuilder::new()
        .with_config(config)
        .with_views(views)
        .with_output(args.output)
        .with_texture_size(args.texture_size)
        .with_logging(LoggingConfig {
            level: args.log_level,
        }))
}

fn main() {
    let args = Args::parse();

    if let Err(e) = build(args).and_then(AppBuilder::run) {
        eprintln!("meshgen error: {}", e);
        std::process::exit(1);
    }
}
