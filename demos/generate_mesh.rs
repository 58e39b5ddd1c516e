//! Mesh generation example
//!
//! Reconstructs a mesh from a 3x2 grid of views (the layout multi-view
//! diffusion models produce) and writes OBJ, MTL and PNG next to each other.
//!
//! Usage:
//!   cargo run --release --example generate_mesh -- <views.png> [output.obj] [texture_size]
//!
//! The first run downloads the checkpoint into the models directory.

use meshgen::{GeneratorConfig, MeshGenerator, split_view_grid};
use std::path::PathBuf;
use tracing::{error, info};

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        return Err("usage: generate_mesh <views.png> [output.obj] [texture_size]".into());
    };
    let output = PathBuf::from(args.next().unwrap_or_else(|| "mesh.obj".to_string()));
    let texture_size: u32 = match args.next() {
        Some(s) => s.parse()?,
        None => 1024,
    };

    let grid = image::open(&input)?.to_rgb8();
    let views = split_view_grid(&grid, 3, 2)?;
    info!("Loaded {} views from {}", views.len(), input);

    let generator = MeshGenerator::new(&GeneratorConfig::default())?;
    generator.generate(&views, texture_size, &output)?;
    info!("Wrote {}", output.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
