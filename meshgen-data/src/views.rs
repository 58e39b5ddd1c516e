//! Splitting tiled multi-view images into individual views.
//!
//! Multi-view diffusion models usually emit all views as one image, tiled
//! row-major in a fixed grid (3 rows by 2 columns for six views).

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while splitting a view grid.
#[derive(Debug, Error)]
pub enum ViewGridError {
    #[error("Grid {rows}x{cols} must have at least one row and one column")]
    EmptyGrid { rows: u32, cols: u32 },

    #[error("Image {width}x{height} does not divide into a {rows}x{cols} grid")]
    Indivisible {
        width: u32,
        height: u32,
        rows: u32,
        cols: u32,
    },
}

/// Split `image` into `rows * cols` equally sized views, row-major.
pub fn split_view_grid(
    image: &RgbImage,
    rows: u32,
    cols: u32,
) -> Result<Vec<RgbImage>, ViewGridError> {
    if rows == 0 || cols == 0 {
        return Err(ViewGridError::EmptyGrid { rows, cols });
    }
    let (width, height) = image.dimensions();
    if width % cols != 0 || height % rows != 0 {
        return Err(ViewGridError::Indivisible {
            width,
            height,
            rows,
            cols,
        });
    }

    let (tile_w, tile_h) = (width / cols, height / rows);
    debug!("Splitting {}x{} image into {}x{} tiles", width, height, tile_w, tile_h);

    let mut views = Vec::with_capacity((rows * cols) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let view = image::imageops::crop_imm(image, col * tile_w, row * tile_h, tile_w, tile_h);
            views.push(view.to_image());
        }
    }
    Ok(views)
}
