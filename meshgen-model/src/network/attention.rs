//! Multi-head attention building blocks.

use crate::error::Result;
use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

/// `[b, n, h * d]` to `[b, h, n, d]`.
pub fn split_heads(x: &Tensor, heads: usize) -> candle_core::Result<Tensor> {
    let (b, n, c) = x.dims3()?;
    x.reshape((b, n, heads, c / heads))?.transpose(1, 2)?.contiguous()
}

/// `[b, h, n, d]` to `[b, n, h * d]`.
pub fn merge_heads(x: &Tensor) -> candle_core::Result<Tensor> {
    let (b, h, n, d) = x.dims4()?;
    x.transpose(1, 2)?.contiguous()?.reshape((b, n, h * d))
}

/// Softmax attention over `[b, h, n, d]` inputs.
pub fn scaled_dot_product(q: &Tensor, k: &Tensor, v: &Tensor) -> candle_core::Result<Tensor> {
    let d = q.dim(candle_core::D::Minus1)?;
    let scale = 1.0 / (d as f64).sqrt();
    let scores = q.matmul(&k.t()?.contiguous()?)?.affine(scale, 0.0)?;
    let probs = candle_nn::ops::softmax_last_dim(&scores)?;
    probs.matmul(v)
}

/// Bias-free `nn.MultiheadAttention` with `batch_first` inputs.
#[derive(Debug, Clone)]
pub struct MultiheadAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
}

impl MultiheadAttention {
    /// Self-attention: one packed `in_proj_weight` of shape `[3 * dim, dim]`.
    pub fn new_self(dim: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        let packed = vb.get((3 * dim, dim), "in_proj_weight")?;
        let part = |i: usize| -> candle_core::Result<Linear> {
            Ok(Linear::new(packed.narrow(0, i * dim, dim)?.contiguous()?, None))
        };
        Ok(Self {
            q_proj: part(0)?,
            k_proj: part(1)?,
            v_proj: part(2)?,
            out_proj: candle_nn::linear_no_bias(dim, dim, vb.pp("out_proj"))?,
            num_heads,
        })
    }

    /// Cross-attention with keys and values of width `kv_dim`: separate
    /// `q_proj_weight`, `k_proj_weight` and `v_proj_weight`.
    pub fn new_cross(dim: usize, kv_dim: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            q_proj: Linear::new(vb.get((dim, dim), "q_proj_weight")?, None),
            k_proj: Linear::new(vb.get((dim, kv_dim), "k_proj_weight")?, None),
            v_proj: Linear::new(vb.get((dim, kv_dim), "v_proj_weight")?, None),
            out_proj: candle_nn::linear_no_bias(dim, dim, vb.pp("out_proj"))?,
            num_heads,
        })
    }

    /// Attend from `query` `[b, n, dim]` to `context` `[b, m, kv_dim]`.
    pub fn forward(&self, query: &Tensor, context: &Tensor) -> candle_core::Result<Tensor> {
        let q = split_heads(&self.q_proj.forward(query)?, self.num_heads)?;
        let k = split_heads(&self.k_proj.forward(context)?, self.num_heads)?;
        let v = split_heads(&self.v_proj.forward(context)?, self.num_heads)?;
        let attended = merge_heads(&scaled_dot_product(&q, &k, &v)?)?;
        self.out_proj.forward(&attended)
    }
}
