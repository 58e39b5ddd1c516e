//! Transformer that turns image tokens into a triplane.
//!
//! Learned queries, one per low-resolution triplane cell, cross-attend to the
//! image tokens. A transposed convolution then doubles the plane resolution.

use super::attention::MultiheadAttention;
use crate::config::ModelConfig;
use crate::error::Result;
use candle_core::{Module, Tensor};
use candle_nn::{
    ConvTranspose2d, ConvTranspose2dConfig, LayerNorm, Linear, VarBuilder, conv_transpose2d,
    layer_norm, linear,
};

const MLP_RATIO: usize = 4;

#[derive(Debug, Clone)]
struct TransformerBlock {
    norm1: LayerNorm,
    cross_attn: MultiheadAttention,
    norm2: LayerNorm,
    self_attn: MultiheadAttention,
    norm3: LayerNorm,
    mlp_in: Linear,
    mlp_out: Linear,
}

impl TransformerBlock {
    fn new(dim: usize, cond_dim: usize, heads: usize, eps: f64, vb: VarBuilder) -> Result<Self> {
        // Keys and values of the same width as the queries share one packed
        // projection.
        let cross_attn = if cond_dim == dim {
            MultiheadAttention::new_self(dim, heads, vb.pp("cross_attn"))?
        } else {
            MultiheadAttention::new_cross(dim, cond_dim, heads, vb.pp("cross_attn"))?
        };
        let mlp = vb.pp("mlp");
        Ok(Self {
            norm1: layer_norm(dim, eps, vb.pp("norm1"))?,
            cross_attn,
            norm2: layer_norm(dim, eps, vb.pp("norm2"))?,
            self_attn: MultiheadAttention::new_self(dim, heads, vb.pp("self_attn"))?,
            norm3: layer_norm(dim, eps, vb.pp("norm3"))?,
            mlp_in: linear(dim, dim * MLP_RATIO, mlp.pp(0))?,
            mlp_out: linear(dim * MLP_RATIO, dim, mlp.pp(3))?,
        })
    }

    fn forward(&self, x: &Tensor, cond: &Tensor) -> candle_core::Result<Tensor> {
        let x = (x + self.cross_attn.forward(&self.norm1.forward(x)?, cond)?)?;
        let h = self.norm2.forward(&x)?;
        let x = (&x + self.self_attn.forward(&h, &h)?)?;
        let h = self.mlp_in.forward(&self.norm3.forward(&x)?)?.gelu_erf()?;
        x + self.mlp_out.forward(&h)?
    }
}

#[derive(Debug, Clone)]
pub struct TriplaneTransformer {
    pos_embed: Tensor,
    layers: Vec<TransformerBlock>,
    norm: LayerNorm,
    deconv: ConvTranspose2d,
    low_res: usize,
}

impl TriplaneTransformer {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.transformer_dim;
        let low_res = config.triplane_low_res;
        let cond_dim = config.encoder.hidden_size;

        let layer_vb = vb.pp("layers");
        let layers = (0..config.transformer_layers)
            .map(|i| {
                TransformerBlock::new(
                    dim,
                    cond_dim,
                    config.transformer_heads,
                    config.transformer_eps,
                    layer_vb.pp(i),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pos_embed: vb.get((1, 3 * low_res * low_res, dim), "pos_embed")?,
            layers,
            norm: layer_norm(dim, config.transformer_eps, vb.pp("norm"))?,
            deconv: conv_transpose2d(
                dim,
                config.triplane_dim,
                2,
                ConvTranspose2dConfig {
                    stride: 2,
                    ..Default::default()
                },
                vb.pp("deconv"),
            )?,
            low_res,
        })
    }

    /// Image tokens `[n, tokens, cond_dim]` to planes `[n, 3, c, 2r, 2r]`.
    pub fn forward(&self, image_feats: &Tensor) -> candle_core::Result<Tensor> {
        let n = image_feats.dim(0)?;
        let (_, l, d) = self.pos_embed.dims3()?;
        let r = self.low_res;

        let mut x = self.pos_embed.broadcast_as((n, l, d))?.contiguous()?;
        for layer in &self.layers {
            x = layer.forward(&x, image_feats)?;
        }
        let x = self.norm.forward(&x)?;

        // [n, 3, r, r, d] -> [3n, d, r, r], plane-major so each plane deconvolves alone.
        let x = x
            .reshape((n, 3, r, r, d))?
            .permute((1, 0, 4, 2, 3))?
            .contiguous()?
            .reshape((3 * n, d, r, r))?;
        let x = self.deconv.forward(&x)?;
        let (_, c, h, w) = x.dims4()?;
        x.reshape((3, n, c, h, w))?
            .permute((1, 0, 2, 3, 4))?
            .contiguous()
    }
}
