//! Sequential MLPs with PyTorch `nn.Sequential` parameter names.

use crate::error::Result;
use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

/// Activation between the linear layers of an [`Mlp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Silu,
}

impl Activation {
    pub fn apply(self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Relu => x.relu(),
            Activation::Silu => x.silu(),
        }
    }
}

/// `nn.Sequential` of linear layers with an activation between each pair.
///
/// Linear layers sit at even indices, matching the parameter names of a
/// sequential whose activations occupy the odd slots.
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Linear>,
    activation: Activation,
}

impl Mlp {
    /// `dims` lists the width of every layer boundary, input first.
    pub fn new(dims: &[usize], activation: Activation, vb: VarBuilder) -> Result<Self> {
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| candle_nn::linear(pair[0], pair[1], vb.pp(2 * i)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { layers, activation })
    }
}

impl Module for Mlp {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let mut x = x.clone();
        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = self.activation.apply(&x)?;
            }
        }
        Ok(x)
    }
}
