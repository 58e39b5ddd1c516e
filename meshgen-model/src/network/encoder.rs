//! Camera-conditioned ViT image encoder.
//!
//! A DINO ViT-B/16 whose layers are modulated by the camera of each view
//! (adaptive layer norm). Every view becomes a class token plus one token per
//! patch; the tokens of all views of an object are concatenated.

use super::attention::{merge_heads, scaled_dot_product, split_heads};
use super::layers::{Activation, Mlp};
use crate::config::EncoderConfig;
use crate::error::Result;
use candle_core::{Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, LayerNorm, Linear, VarBuilder, conv2d, layer_norm, linear};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// `x * (1 + scale) + shift`, with per-sample `shift` and `scale` of shape `[b, d]`.
fn modulate(x: &Tensor, shift: &Tensor, scale: &Tensor) -> candle_core::Result<Tensor> {
    x.broadcast_mul(&scale.unsqueeze(1)?.affine(1.0, 1.0)?)?
        .broadcast_add(&shift.unsqueeze(1)?)
}

#[derive(Debug, Clone)]
struct ViTSelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    num_heads: usize,
}

impl ViTSelfAttention {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.hidden_size;
        let inner = vb.pp("attention");
        Ok(Self {
            query: linear(d, d, inner.pp("query"))?,
            key: linear(d, d, inner.pp("key"))?,
            value: linear(d, d, inner.pp("value"))?,
            output: linear(d, d, vb.pp("output").pp("dense"))?,
            num_heads: config.num_heads,
        })
    }
}

impl Module for ViTSelfAttention {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let q = split_heads(&self.query.forward(x)?, self.num_heads)?;
        let k = split_heads(&self.key.forward(x)?, self.num_heads)?;
        let v = split_heads(&self.value.forward(x)?, self.num_heads)?;
        let attended = merge_heads(&scaled_dot_product(&q, &k, &v)?)?;
        self.output.forward(&attended)
    }
}

/// Transformer layer with camera modulation before attention and MLP.
#[derive(Debug, Clone)]
struct ModulatedLayer {
    attention: ViTSelfAttention,
    intermediate: Linear,
    output: Linear,
    layernorm_before: LayerNorm,
    layernorm_after: LayerNorm,
    ada_ln: Linear,
}

impl ModulatedLayer {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.hidden_size;
        let hidden = config.intermediate_size;
        let eps = config.layer_norm_eps;
        Ok(Self {
            attention: ViTSelfAttention::new(config, vb.pp("attention"))?,
            intermediate: linear(d, hidden, vb.pp("intermediate").pp("dense"))?,
            output: linear(hidden, d, vb.pp("output").pp("dense"))?,
            layernorm_before: layer_norm(d, eps, vb.pp("layernorm_before"))?,
            layernorm_after: layer_norm(d, eps, vb.pp("layernorm_after"))?,
            // Index 0 of the modulation sequential is the SiLU.
            ada_ln: linear(d, 4 * d, vb.pp("adaLN_modulation").pp(1))?,
        })
    }

    fn forward(&self, x: &Tensor, condition: &Tensor) -> candle_core::Result<Tensor> {
        let modulation = self.ada_ln.forward(&condition.silu()?)?.chunk(4, 1)?;
        let (shift_msa, scale_msa, shift_mlp, scale_mlp) =
            (&modulation[0], &modulation[1], &modulation[2], &modulation[3]);

        let h = modulate(&self.layernorm_before.forward(x)?, shift_msa, scale_msa)?;
        let x = (self.attention.forward(&h)? + x)?;

        let h = modulate(&self.layernorm_after.forward(&x)?, shift_mlp, scale_mlp)?;
        let h = self.intermediate.forward(&h)?.gelu_erf()?;
        self.output.forward(&h)? + x
    }
}

/// Image encoder producing per-view token features.
#[derive(Debug, Clone)]
pub struct DinoEncoder {
    patch_embed: Conv2d,
    cls_token: Tensor,
    position_embeddings: Tensor,
    layers: Vec<ModulatedLayer>,
    layernorm: LayerNorm,
    camera_embedder: Mlp,
    config: EncoderConfig,
}

impl DinoEncoder {
    pub fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.hidden_size;
        let model = vb.pp("model");
        let embeddings = model.pp("embeddings");
        let grid = config.pretrain_image_size / config.patch_size;

        let patch_embed = conv2d(
            3,
            d,
            config.patch_size,
            Conv2dConfig {
                stride: config.patch_size,
                ..Default::default()
            },
            embeddings.pp("patch_embeddings").pp("projection"),
        )?;
        let cls_token = embeddings.get((1, 1, d), "cls_token")?;
        let position_embeddings =
            embeddings.get((1, grid * grid + 1, d), "position_embeddings")?;

        let layer_vb = model.pp("encoder").pp("layer");
        let layers = (0..config.num_layers)
            .map(|i| ModulatedLayer::new(config, layer_vb.pp(i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patch_embed,
            cls_token,
            position_embeddings,
            layers,
            layernorm: layer_norm(d, config.layer_norm_eps, model.pp("layernorm"))?,
            camera_embedder: Mlp::new(
                &[config.camera_dim, d, d],
                Activation::Silu,
                vb.pp("camera_embedder"),
            )?,
            config: config.clone(),
        })
    }

    /// Encode `images` `[n, v, 3, h, w]` in `[0, 1]` seen from `cameras`
    /// `[n, v, camera_dim]` into `[n, v * (1 + patches), hidden]` tokens.
    pub fn forward(&self, images: &Tensor, cameras: &Tensor) -> candle_core::Result<Tensor> {
        let (n, v, c, h, w) = images.dims5()?;
        let device = images.device();
        let dtype = images.dtype();

        let mean = Tensor::new(&IMAGENET_MEAN, device)?.to_dtype(dtype)?.reshape((1, 3, 1, 1))?;
        let std = Tensor::new(&IMAGENET_STD, device)?.to_dtype(dtype)?.reshape((1, 3, 1, 1))?;
        let pixels = images
            .reshape((n * v, c, h, w))?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;

        let condition = self
            .camera_embedder
            .forward(&cameras.reshape((n * v, self.config.camera_dim))?)?;

        let mut x = self.embed(&pixels)?;
        for layer in &self.layers {
            x = layer.forward(&x, &condition)?;
        }
        let x = self.layernorm.forward(&x)?;

        let (_, tokens, d) = x.dims3()?;
        x.reshape((n, v * tokens, d))
    }

    fn embed(&self, pixels: &Tensor) -> candle_core::Result<Tensor> {
        let (b, _, h, w) = pixels.dims4()?;
        let d = self.config.hidden_size;
        let patches = self
            .patch_embed
            .forward(pixels)?
            .flatten_from(2)?
            .transpose(1, 2)?;
        let cls = self.cls_token.broadcast_as((b, 1, d))?.contiguous()?;
        let tokens = Tensor::cat(&[&cls, &patches], 1)?;

        let patch = self.config.patch_size;
        let pos = self.position_embeddings_for(h / patch, w / patch)?;
        tokens.broadcast_add(&pos)
    }

    /// Position embeddings for a `grid_h` x `grid_w` patch grid, resampled
    /// from the pretraining grid when the sizes differ.
    fn position_embeddings_for(&self, grid_h: usize, grid_w: usize) -> candle_core::Result<Tensor> {
        let trained = self.config.pretrain_image_size / self.config.patch_size;
        if grid_h == trained && grid_w == trained {
            return Ok(self.position_embeddings.clone());
        }

        let d = self.config.hidden_size;
        let device = self.position_embeddings.device();
        let dtype = self.position_embeddings.dtype();
        let class_pos = self.position_embeddings.narrow(1, 0, 1)?;
        // [1, trained², d] -> [d, trained, trained] for channel-major resampling.
        let patch_pos = self
            .position_embeddings
            .narrow(1, 1, trained * trained)?
            .squeeze(0)?
            .t()?
            .to_dtype(candle_core::DType::F32)?
            .contiguous()?
            .flatten_all()?
            .to_vec1::<f32>()?;

        // A small offset keeps floating point rounding from losing a row.
        let scale_h = (grid_h as f64 + 0.1) / trained as f64;
        let scale_w = (grid_w as f64 + 0.1) / trained as f64;
        let resampled = bicubic_resize(
            &patch_pos,
            d,
            (trained, trained),
            (grid_h, grid_w),
            (scale_h, scale_w),
        );

        let patch_pos = Tensor::from_vec(resampled, (d, grid_h * grid_w), device)?
            .t()?
            .contiguous()?
            .unsqueeze(0)?
            .to_dtype(dtype)?;
        Tensor::cat(&[&class_pos, &patch_pos], 1)?.contiguous()
    }
}

const CUBIC_A: f64 = -0.75;

fn cubic_near(x: f64) -> f64 {
    ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
}

fn cubic_far(x: f64) -> f64 {
    ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
}

/// Four tap positions and weights for output index `dst`.
fn cubic_taps(dst: usize, scale: f64, len: usize) -> ([usize; 4], [f64; 4]) {
    let src = (dst as f64 + 0.5) / scale - 0.5;
    let base = src.floor();
    let t = src - base;
    let weights = [cubic_far(t + 1.0), cubic_near(t), cubic_near(1.0 - t), cubic_far(2.0 - t)];
    let last = len as i64 - 1;
    let mut taps = [0usize; 4];
    for (k, tap) in taps.iter_mut().enumerate() {
        *tap = (base as i64 - 1 + k as i64).clamp(0, last) as usize;
    }
    (taps, weights)
}

/// Bicubic resampling of `channels` row-major planes, matching
/// `F.interpolate(mode="bicubic", align_corners=False)` with explicit scale
/// factors.
pub fn bicubic_resize(
    input: &[f32],
    channels: usize,
    (in_h, in_w): (usize, usize),
    (out_h, out_w): (usize, usize),
    (scale_h, scale_w): (f64, f64),
) -> Vec<f32> {
    let rows: Vec<_> = (0..out_h).map(|y| cubic_taps(y, scale_h, in_h)).collect();
    let cols: Vec<_> = (0..out_w).map(|x| cubic_taps(x, scale_w, in_w)).collect();

    let mut output = vec![0f32; channels * out_h * out_w];
    for c in 0..channels {
        let plane = &input[c * in_h * in_w..(c + 1) * in_h * in_w];
        let out = &mut output[c * out_h * out_w..(c + 1) * out_h * out_w];
        for (y, (ry, wy)) in rows.iter().enumerate() {
            for (x, (rx, wx)) in cols.iter().enumerate() {
                let mut acc = 0f64;
                for i in 0..4 {
                    let row = &plane[ry[i] * in_w..(ry[i] + 1) * in_w];
                    let mut line = 0f64;
                    for j in 0..4 {
                        line += row[rx[j]] as f64 * wx[j];
                    }
                    acc += line * wy[i];
                }
                out[y * out_w + x] = acc as f32;
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::weights::random;
    use candle_core::{DType, Device};

    #[test]
    fn test_cubic_weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            let sum = cubic_far(t + 1.0) + cubic_near(t) + cubic_near(1.0 - t) + cubic_far(2.0 - t);
            assert!((sum - 1.0).abs() < 1e-9);
        }
        let (taps, w) = cubic_taps(0, 20.1 / 14.0, 14);
        assert_eq!(taps, [0, 0, 0, 1]);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bicubic_preserves_constants() {
        let input = vec![2.5f32; 2 * 14 * 14];
        let out = bicubic_resize(&input, 2, (14, 14), (20, 20), (20.1 / 14.0, 20.1 / 14.0));
        assert_eq!(out.len(), 2 * 400);
        assert!(out.iter().all(|v| (v - 2.5).abs() < 1e-5));
    }

    #[test]
    fn test_bicubic_identity_scale() {
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let out = bicubic_resize(&input, 1, (4, 4), (4, 4), (1.0, 1.0));
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    fn tiny_config() -> EncoderConfig {
        EncoderConfig {
            hidden_size: 8,
            num_layers: 2,
            num_heads: 2,
            intermediate_size: 16,
            patch_size: 4,
            pretrain_image_size: 8,
            ..EncoderConfig::default()
        }
    }

    #[test]
    fn test_encoder_token_layout() {
        let config = tiny_config();
        let (encoder, names) = random(0.02, |vb| DinoEncoder::new(&config, vb.pp("encoder")));

        let images = Tensor::rand(0f32, 1.0, (1, 6, 3, 12, 12), &Device::Cpu).unwrap();
        let cameras = Tensor::rand(0f32, 1.0, (1, 6, 16), &Device::Cpu).unwrap();
        let tokens = encoder.forward(&images, &cameras).unwrap();
        // 12 / 4 = 3 patches per side, plus the class token.
        assert_eq!(tokens.dims(), &[1, 6 * 10, 8]);

        assert!(names.contains_key("encoder.model.embeddings.cls_token"));
        assert!(names.contains_key("encoder.model.encoder.layer.1.adaLN_modulation.1.weight"));
        assert!(names.contains_key("encoder.model.encoder.layer.0.attention.attention.query.bias"));
        assert!(names.contains_key("encoder.camera_embedder.2.weight"));
        assert!(!names.contains_key("encoder.model.pooler.dense.weight"));
    }

    #[test]
    fn test_zero_modulation_is_identity_scale() {
        let x = Tensor::new(&[[[1f32, 2.0], [3.0, 4.0]]], &Device::Cpu).unwrap();
        let zeros = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap();
        let out = modulate(&x, &zeros, &zeros).unwrap();
        assert_eq!(out.to_vec3::<f32>().unwrap(), x.to_vec3::<f32>().unwrap());
    }
}
