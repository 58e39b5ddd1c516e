//! Generation job setup and run with builder pattern.

use crate::error::AppError;
use image::RgbImage;
use meshgen_data::split_view_grid;
use meshgen_model::{GeneratorConfig, IMAGE_SIZE, MeshGenerator};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rows and columns of a tiled six-view image.
pub const GRID_ROWS: u32 = 3;
pub const GRID_COLS: u32 = 2;

/// Logging configuration.
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where the input views come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewSource {
    /// One image file per view, in camera order.
    Files(Vec<PathBuf>),
    /// One image with all views tiled row-major, 3 rows by 2 columns.
    Grid(PathBuf),
}

/// Builder for a single generation run.
pub struct AppBuilder {
    config: GeneratorConfig,
    logging: LoggingConfig,
    views: Option<ViewSource>,
    output: PathBuf,
    texture_size: u32,
}

impl AppBuilder {
    /// Create a new AppBuilder with default settings.
    pub fn new() -> Self {
        Self {
            config: GeneratorConfig::default(),
            logging: LoggingConfig::default(),
            views: None,
            output: PathBuf::from("mesh.obj"),
            texture_size: 1024,
        }
    }

    /// Set the generator configuration.
    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the input views.
    pub fn with_views(mut self, views: ViewSource) -> Self {
        self.views = Some(views);
        self
    }

    /// Set the output OBJ path.
    pub fn with_output(mut self, path: PathBuf) -> Self {
        self.output = path;
        self
    }

    /// Set the baked texture resolution.
    pub fn with_texture_size(mut self, size: u32) -> Self {
        self.texture_size = size;
        self
    }

    /// Configure logging.
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = config;
        self
    }

    /// Run the generation.
    pub fn run(self) -> Result<(), AppError> {
        self.init_logging();

        let views = self.views.as_ref().ok_or(AppError::MissingViews)?;
        let images = load_views(views)?;

        let generator = MeshGenerator::new(&self.config)?;
        generator.generate(&images, self.texture_size, &self.output)?;
        info!("Done: {}", self.output.display());
        Ok(())
    }

    fn init_logging(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.logging.level)),
            )
            .with_target(false)
            .init();
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn open_rgb(path: &Path) -> Result<RgbImage, AppError> {
    let image = image::open(path).map_err(|source| AppError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Load the input views as RGB images.
///
/// Size and count are checked by the generator, so this accepts anything
/// that decodes.
pub fn load_views(source: &ViewSource) -> Result<Vec<RgbImage>, AppError> {
    match source {
        ViewSource::Files(paths) => paths.iter().map(|p| open_rgb(p)).collect(),
        ViewSource::Grid(path) => {
            let grid = open_rgb(path)?;
            let expected = (GRID_COLS * IMAGE_SIZE, GRID_ROWS * IMAGE_SIZE);
            if grid.dimensions() != expected {
                warn!(
                    "View grid {} is {}x{}, expected {}x{}",
                    path.display(),
                    grid.width(),
                    grid.height(),
                    expected.0,
                    expected.1
                );
            }
            Ok(split_view_grid(&grid, GRID_ROWS, GRID_COLS)?)
        }
    }
}
