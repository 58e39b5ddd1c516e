//! Decoding a triplane into a surface and its colors.

use crate::config::ModelConfig;
use crate::error::Result;
use crate::geometry::{
    CubeWeights, SurfaceMesh, VoxelGrid, extract_surface, fix_empty_shape, surface_cubes,
};
use crate::network::decoder::{CUBE_CORNERS, OsgDecoder};
use crate::triplane::TriplaneField;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use glam::Vec3;
use tracing::debug;

/// Points decoded per batch.
const POINT_CHUNK: usize = 1 << 16;

/// Cubes whose weights are decoded per batch.
const CUBE_CHUNK: usize = 1 << 13;

#[derive(Debug, Clone)]
pub struct TriplaneSynthesizer {
    decoder: OsgDecoder,
    grid: VoxelGrid,
    /// Largest offset a grid vertex may move.
    deformation_scale: f32,
}

impl TriplaneSynthesizer {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            decoder: OsgDecoder::new(config, vb.pp("decoder"))?,
            grid: VoxelGrid::new(config.grid_res, config.grid_scale),
            deformation_scale: 1.0 / (config.grid_res as f32 * config.deformation_multiplier),
        })
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Predict the SDF over the grid and extract its zero level set.
    #[tracing::instrument(skip_all, fields(res = self.grid.resolution()))]
    pub fn extract_geometry(&self, field: &TriplaneField, device: &Device) -> Result<SurfaceMesh> {
        let rest = self.grid.vertices();
        let mut sdf = Vec::with_capacity(rest.len());
        let mut positions = Vec::with_capacity(rest.len());

        for chunk in rest.chunks(POINT_CHUNK) {
            let features = field.sample(chunk, device)?;
            let (s, d) = self.decoder.geometry(&features)?;
            sdf.extend(s.to_dtype(DType::F32)?.to_vec1::<f32>()?);
            let d = d
                .tanh()?
                .affine(self.deformation_scale as f64, 0.0)?
                .to_dtype(DType::F32)?
                .to_vec2::<f32>()?;
            positions.extend(
                chunk
                    .iter()
                    .zip(d)
                    .map(|(p, d)| *p + Vec3::new(d[0], d[1], d[2])),
            );
        }

        fix_empty_shape(&self.grid, &mut sdf);
        let cubes = surface_cubes(&self.grid, &sdf);
        debug!("{} of {} cubes cross the surface", cubes.len(), self.grid.cube_count());

        let weights = self.cube_weights(field, &rest, &cubes, device)?;
        Ok(extract_surface(&self.grid, &positions, &sdf, &cubes, &weights))
    }

    /// Decode the weights of `cubes` from the features at their rest corners.
    fn cube_weights(
        &self,
        field: &TriplaneField,
        rest: &[Vec3],
        cubes: &[usize],
        device: &Device,
    ) -> Result<Vec<CubeWeights>> {
        let point_dim = self.decoder.point_dim();
        let mut weights = Vec::with_capacity(cubes.len());
        for chunk in cubes.chunks(CUBE_CHUNK) {
            let corners: Vec<Vec3> = chunk
                .iter()
                .flat_map(|&cube| self.grid.cube_corners(cube).map(|v| rest[v]))
                .collect();
            let features = field
                .sample(&corners, device)?
                .reshape((chunk.len(), CUBE_CORNERS * point_dim))?;
            let raw = self
                .decoder
                .cube_weights(&features)?
                .to_dtype(DType::F32)?
                .to_vec2::<f32>()?;
            weights.extend(raw.iter().map(|r| CubeWeights::from_raw(r)));
        }
        Ok(weights)
    }

    /// Colors at `points`, nominally in `[0, 1]`.
    pub fn colors(
        &self,
        field: &TriplaneField,
        points: &[Vec3],
        device: &Device,
    ) -> Result<Vec<[f32; 3]>> {
        let mut colors = Vec::with_capacity(points.len());
        for chunk in points.chunks(POINT_CHUNK) {
            let features = field.sample(chunk, device)?;
            let rgb = self
                .decoder
                .rgb(&features)?
                .to_dtype(DType::F32)?
                .to_vec2::<f32>()?;
            colors.extend(rgb.into_iter().map(|c| [c[0], c[1], c[2]]));
        }
        Ok(colors)
    }
}
