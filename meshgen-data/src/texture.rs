//! Float texture maps and their conversion to 8-bit images.

use image::RgbImage;

/// An RGB float texture, row 0 at v = 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureMap {
    width: u32,
    height: u32,
    /// Interleaved RGB, row-major.
    data: Vec<f32>,
}

impl TextureMap {
    /// Create a black texture.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize * 3],
        }
    }

    /// Wrap existing interleaved RGB data.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> [f32; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn set(&mut self, x: u32, y: u32, rgb: [f32; 3]) {
        let i = self.offset(x, y);
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    pub fn as_raw(&self) -> &[f32] {
        &self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    /// Quantize to an 8-bit image ready to be saved next to an OBJ.
    ///
    /// Values are scaled to [0, 255] and clipped. Texels whose channel sum is
    /// at most 3 (background) take the 3x3 per-channel maximum of their
    /// neighbourhood so seams do not bleed black. The result is flipped
    /// vertically so the first image row is v = 1.
    pub fn to_rgb_image(&self) -> RgbImage {
        let (w, h) = (self.width as usize, self.height as usize);
        let scaled: Vec<f32> = self
            .data
            .iter()
            .map(|v| (v * 255.0).clamp(0.0, 255.0))
            .collect();

        let mut out = RgbImage::new(self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 3;
                let texel = [scaled[i], scaled[i + 1], scaled[i + 2]];
                let rgb = if texel.iter().sum::<f32>() <= 3.0 {
                    dilate_at(&scaled, w, h, x, y)
                } else {
                    texel
                };
                let pixel = image::Rgb(rgb.map(|c| c.clamp(0.0, 255.0) as u8));
                out.put_pixel(x as u32, (h - 1 - y) as u32, pixel);
            }
        }
        out
    }
}

fn dilate_at(scaled: &[f32], w: usize, h: usize, x: usize, y: usize) -> [f32; 3] {
    let mut rgb = [0.0f32; 3];
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            let i = (ny * w + nx) * 3;
            for c in 0..3 {
                rgb[c] = rgb[c].max(scaled[i + c]);
            }
        }
    }
    rgb
}
