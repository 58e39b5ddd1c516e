//! Point decoder: triplane features to SDF, deformation, color and
//! FlexiCubes weights.

use super::layers::{Activation, Mlp};
use crate::config::ModelConfig;
use crate::error::Result;
use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

/// Corners per cube; the weight network sees the features of all of them.
pub const CUBE_CORNERS: usize = 8;

/// Per-cube FlexiCubes weights: 12 edge betas, 8 corner alphas, one gamma.
pub const CUBE_WEIGHTS: usize = 21;

/// Colors are squashed into a range slightly wider than `[0, 1]`.
const RGB_PADDING: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct OsgDecoder {
    net_sdf: Mlp,
    net_rgb: Mlp,
    net_deformation: Mlp,
    net_weight: Mlp,
    point_dim: usize,
}

impl OsgDecoder {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let point_dim = 3 * config.triplane_dim;
        let hidden = config.decoder_hidden_dim;
        let dims = |input: usize, output: usize| -> Vec<usize> {
            let mut dims = vec![input];
            dims.extend(std::iter::repeat_n(hidden, config.decoder_layers - 1));
            dims.push(output);
            dims
        };
        let mlp = |name: &str, input: usize, output: usize| {
            Mlp::new(&dims(input, output), Activation::Relu, vb.pp(name))
        };

        Ok(Self {
            net_sdf: mlp("net_sdf", point_dim, 1)?,
            net_rgb: mlp("net_rgb", point_dim, 3)?,
            net_deformation: mlp("net_deformation", point_dim, 3)?,
            net_weight: mlp("net_weight", CUBE_CORNERS * point_dim, CUBE_WEIGHTS)?,
            point_dim,
        })
    }

    /// Width of one point's concatenated plane features.
    pub fn point_dim(&self) -> usize {
        self.point_dim
    }

    /// Signed distance `[m]` and raw deformation `[m, 3]` for point features `[m, point_dim]`.
    pub fn geometry(&self, features: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let sdf = self.net_sdf.forward(features)?.squeeze(1)?;
        let deformation = self.net_deformation.forward(features)?;
        Ok((sdf, deformation))
    }

    /// FlexiCubes weights `[f, 21]` from the corner features `[f, 8 * point_dim]` of each cube.
    pub fn cube_weights(&self, corner_features: &Tensor) -> candle_core::Result<Tensor> {
        self.net_weight.forward(corner_features)?.affine(0.1, 0.0)
    }

    /// Colors in `[-0.001, 1.001]`, `[m, 3]`.
    pub fn rgb(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        candle_nn::ops::sigmoid(&self.net_rgb.forward(features)?)?
            .affine(1.0 + 2.0 * RGB_PADDING, -RGB_PADDING)
    }
}
