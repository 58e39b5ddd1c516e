//! The reconstruction network
//!
//! - [`layers`], [`attention`]: PyTorch-layout building blocks over candle-nn
//! - [`encoder`]: camera-modulated ViT over the input views
//! - [`transformer`]: image tokens to triplane
//! - [`decoder`]: per-point MLP heads

pub mod attention;
pub mod decoder;
pub mod encoder;
pub mod layers;
pub mod transformer;

pub use decoder::OsgDecoder;
pub use encoder::DinoEncoder;
pub use transformer::TriplaneTransformer;

use crate::config::ModelConfig;
use crate::error::{MeshGenError, Result};
use crate::synthesizer::TriplaneSynthesizer;
use crate::triplane::TriplaneField;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use meshgen_data::{
    ColoredMesh, MeshOutput, TextureMap, TexturedMesh, UvAtlas, rasterize_positions,
};
use tracing::{debug, info};

/// How [`LrmMesh::extract_mesh`] colors the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Bake a UV texture; otherwise color the vertices.
    pub use_texture_map: bool,
    /// Side length of the baked texture in texels.
    pub texture_resolution: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            use_texture_map: false,
            texture_resolution: 1024,
        }
    }
}

/// Settings the geometry extractor was initialized with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GeometrySettings {
    fovy: f32,
}

/// Images to triplane to textured mesh.
pub struct LrmMesh {
    encoder: DinoEncoder,
    transformer: TriplaneTransformer,
    synthesizer: TriplaneSynthesizer,
    geometry: Option<GeometrySettings>,
    device: Device,
}

impl LrmMesh {
    /// Build the network from `vb`, whose names are those of the generator
    /// module (`encoder.*`, `transformer.*`, `synthesizer.*`).
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encoder: DinoEncoder::new(&config.encoder, vb.pp("encoder"))?,
            transformer: TriplaneTransformer::new(config, vb.pp("transformer"))?,
            synthesizer: TriplaneSynthesizer::new(config, vb.pp("synthesizer"))?,
            geometry: None,
            device: vb.device().clone(),
        })
    }

    /// Set up the geometry extractor.
    ///
    /// The field of view belongs to the training-time renderer; extraction
    /// itself only needs the grid, which is fixed by the model config.
    pub fn init_geometry(&mut self, fovy: f32) {
        let grid = self.synthesizer.grid();
        info!(
            "Geometry extractor: {}³ grid over {:.2} units, fovy {}",
            grid.resolution(),
            grid.scale(),
            fovy
        );
        self.geometry = Some(GeometrySettings { fovy });
    }

    pub fn geometry_fovy(&self) -> Option<f32> {
        self.geometry.map(|g| g.fovy)
    }

    /// Images `[n, v, 3, h, w]` in `[0, 1]` and cameras `[n, v, 16]` to
    /// planes `[n, 3, c, hp, wp]`.
    pub fn forward_planes(&self, images: &Tensor, cameras: &Tensor) -> Result<Tensor> {
        let tokens = self.encoder.forward(images, cameras)?;
        debug!("Image tokens {:?}", tokens.dims());
        Ok(self.transformer.forward(&tokens)?)
    }

    /// Extract a colored surface from the planes of a single object.
    #[tracing::instrument(skip_all, fields(texture = options.use_texture_map))]
    pub fn extract_mesh(&self, planes: &Tensor, options: &ExtractOptions) -> Result<MeshOutput> {
        if self.geometry.is_none() {
            return Err(MeshGenError::GeometryNotInitialized);
        }
        let batch = planes.dim(0)?;
        if batch != 1 {
            return Err(MeshGenError::BatchSize(batch));
        }
        if options.use_texture_map && options.texture_resolution == 0 {
            return Err(MeshGenError::InvalidTextureSize);
        }

        let field = TriplaneField::from_tensor(&planes.get(0)?)?;
        let surface = self.synthesizer.extract_geometry(&field, &self.device)?;
        if surface.is_empty() {
            return Err(MeshGenError::EmptyMesh);
        }
        info!(
            "Extracted surface with {} vertices and {} faces",
            surface.vertices.len(),
            surface.faces.len()
        );

        if !options.use_texture_map {
            let colors = self
                .synthesizer
                .colors(&field, &surface.vertices, &self.device)?
                .into_iter()
                .map(|c| c.map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8))
                .collect();
            return Ok(MeshOutput::Colored(ColoredMesh {
                vertices: surface.vertices,
                faces: surface.faces,
                colors,
            }));
        }

        let resolution = options.texture_resolution;
        let atlas = UvAtlas::pack(surface.faces.len(), resolution);
        let texels = rasterize_positions(&surface.vertices, &surface.faces, &atlas, resolution);
        let (coords, points): (Vec<(u32, u32)>, Vec<_>) =
            texels.covered().map(|(x, y, p)| ((x, y), p)).unzip();
        debug!("Baking {} of {} texels", points.len(), resolution as usize * resolution as usize);

        let colors = self.synthesizer.colors(&field, &points, &self.device)?;
        let mut texture = TextureMap::new(resolution, resolution);
        for ((x, y), rgb) in coords.into_iter().zip(colors) {
            texture.set(x, y, rgb);
        }

        Ok(MeshOutput::Textured(TexturedMesh {
            vertices: surface.vertices,
            faces: surface.faces,
            uvs: atlas.uvs,
            uv_faces: atlas.uv_faces,
            texture,
        }))
    }
}
