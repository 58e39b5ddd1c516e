//! Host-side triplane feature sampling.

use candle_core::{DType, Device, Tensor};
use glam::Vec3;
use rayon::prelude::*;

/// Three axis-aligned feature planes covering `[-1, 1]³`.
///
/// Plane 0 is indexed by `(x, y)`, plane 1 by `(x, z)` and plane 2 by
/// `(z, y)`. Sampling is bilinear with zero padding outside the planes, with
/// texel centres at `(i + 0.5) / res` in `[0, 1]` plane coordinates.
#[derive(Debug, Clone)]
pub struct TriplaneField {
    /// `[plane][row][col][channel]`.
    data: Vec<f32>,
    channels: usize,
    height: usize,
    width: usize,
}

impl TriplaneField {
    /// Copy planes `[3, c, h, w]` to the host.
    pub fn from_tensor(planes: &Tensor) -> candle_core::Result<Self> {
        let (n_planes, channels, height, width) = planes.dims4()?;
        if n_planes != 3 {
            candle_core::bail!("expected 3 planes, got {n_planes}");
        }
        let data = planes
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F32)?
            .permute((0, 2, 3, 1))?
            .contiguous()?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Ok(Self {
            data,
            channels,
            height,
            width,
        })
    }

    /// Length of one sampled point: the three planes' features back to back.
    pub fn point_dim(&self) -> usize {
        3 * self.channels
    }

    /// Sample one point into `out`, which must hold `point_dim` values.
    pub fn sample_into(&self, p: Vec3, out: &mut [f32]) {
        let c = self.channels;
        let coords = [(p.x, p.y), (p.x, p.z), (p.z, p.y)];
        for (plane, (u, v)) in coords.into_iter().enumerate() {
            self.sample_plane(plane, u, v, &mut out[plane * c..(plane + 1) * c]);
        }
    }

    fn sample_plane(&self, plane: usize, u: f32, v: f32, out: &mut [f32]) {
        out.fill(0.0);
        let (w, h, c) = (self.width, self.height, self.channels);
        let ix = ((u + 1.0) * w as f32 - 1.0) * 0.5;
        let iy = ((v + 1.0) * h as f32 - 1.0) * 0.5;
        let (x0, y0) = (ix.floor(), iy.floor());
        let (fx, fy) = (ix - x0, iy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let base = plane * h * w * c;
        let taps = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x0 + 1, y0, fx * (1.0 - fy)),
            (x0, y0 + 1, (1.0 - fx) * fy),
            (x0 + 1, y0 + 1, fx * fy),
        ];
        for (x, y, weight) in taps {
            if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 || weight == 0.0 {
                continue;
            }
            let offset = base + (y as usize * w + x as usize) * c;
            for (o, f) in out.iter_mut().zip(&self.data[offset..offset + c]) {
                *o += weight * f;
            }
        }
    }

    /// Features of every point as a `[points, point_dim]` tensor on `device`.
    pub fn sample(&self, points: &[Vec3], device: &Device) -> candle_core::Result<Tensor> {
        let dim = self.point_dim();
        let mut features = vec![0f32; points.len() * dim];
        features
            .par_chunks_mut(dim)
            .zip(points.par_iter())
            .for_each(|(out, &p)| self.sample_into(p, out));
        Tensor::from_vec(features, (points.len(), dim), device)
    }
}
