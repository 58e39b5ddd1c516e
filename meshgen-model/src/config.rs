//! Generator configuration.
//!
//! Defaults reproduce the large reconstruction model exactly; a JSON file
//! only needs the fields it wants to change.

use crate::error::{MeshGenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Architecture of the ViT image encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Hub identifier of the pretrained backbone the weights derive from.
    pub model_name: String,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub intermediate_size: usize,
    pub patch_size: usize,
    /// Image size the position embeddings were trained at.
    pub pretrain_image_size: usize,
    pub layer_norm_eps: f64,
    /// Length of the flattened per-view camera vector.
    pub camera_dim: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_name: "facebook/dino-vitb16".to_string(),
            hidden_size: 768,
            num_layers: 12,
            num_heads: 12,
            intermediate_size: 3072,
            patch_size: 16,
            pretrain_image_size: 224,
            layer_norm_eps: 1e-12,
            camera_dim: 16,
        }
    }
}

/// Architecture of the whole reconstruction network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub encoder: EncoderConfig,
    pub transformer_dim: usize,
    pub transformer_layers: usize,
    pub transformer_heads: usize,
    pub transformer_eps: f64,
    pub triplane_low_res: usize,
    pub triplane_high_res: usize,
    pub triplane_dim: usize,
    /// Ray samples of the volume renderer the checkpoint was trained with.
    /// Mesh extraction never ray-marches, so this is informational.
    pub rendering_samples_per_ray: usize,
    pub grid_res: usize,
    pub grid_scale: f32,
    pub deformation_multiplier: f32,
    pub decoder_hidden_dim: usize,
    pub decoder_layers: usize,
}

impl ModelConfig {
    /// The large model shipped as `instant_mesh_large.ckpt`.
    pub fn instant_mesh_large() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            transformer_dim: 1024,
            transformer_layers: 16,
            transformer_heads: 16,
            transformer_eps: 1e-6,
            triplane_low_res: 32,
            triplane_high_res: 64,
            triplane_dim: 80,
            rendering_samples_per_ray: 128,
            grid_res: 128,
            grid_scale: 2.1,
            deformation_multiplier: 4.0,
            decoder_hidden_dim: 64,
            decoder_layers: 4,
        }
    }

    /// Check the invariants the network layout depends on.
    pub fn validate(&self) -> Result<()> {
        let enc = &self.encoder;
        if enc.num_heads == 0 || enc.hidden_size % enc.num_heads != 0 {
            return Err(MeshGenError::Config(format!(
                "encoder hidden size {} is not divisible by {} heads",
                enc.hidden_size, enc.num_heads
            )));
        }
        if enc.patch_size == 0 || enc.pretrain_image_size % enc.patch_size != 0 {
            return Err(MeshGenError::Config(format!(
                "pretrain image size {} is not a multiple of patch size {}",
                enc.pretrain_image_size, enc.patch_size
            )));
        }
        if self.transformer_heads == 0 || self.transformer_dim % self.transformer_heads != 0 {
            return Err(MeshGenError::Config(format!(
                "transformer dim {} is not divisible by {} heads",
                self.transformer_dim, self.transformer_heads
            )));
        }
        if self.triplane_high_res != 2 * self.triplane_low_res {
            return Err(MeshGenError::Config(format!(
                "triplane high resolution {} must be twice the low resolution {}",
                self.triplane_high_res, self.triplane_low_res
            )));
        }
        if self.decoder_layers < 2 {
            return Err(MeshGenError::Config(
                "decoder needs at least two layers".to_string(),
            ));
        }
        if self.grid_res < 4 {
            return Err(MeshGenError::Config(format!(
                "grid resolution {} is too small",
                self.grid_res
            )));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::instant_mesh_large()
    }
}

/// Where the checkpoint comes from and how it is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub repo_id: String,
    pub filename: String,
    /// Local cache directory. `None` means `Models/` next to the executable.
    pub models_dir: Option<PathBuf>,
    pub endpoint: String,
    /// Key holding the state dict inside a pickled checkpoint.
    pub state_dict_key: String,
    /// Only parameters under this prefix belong to the generator.
    pub prefix: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            repo_id: "TencentARC/InstantMesh".to_string(),
            filename: "instant_mesh_large.ckpt".to_string(),
            models_dir: None,
            endpoint: "https://huggingface.co".to_string(),
            state_dict_key: "state_dict".to_string(),
            prefix: "lrm_generator.".to_string(),
        }
    }
}

impl CheckpointConfig {
    /// Full path of the locally cached checkpoint.
    pub fn local_path(&self) -> PathBuf {
        let dir = self.models_dir.clone().unwrap_or_else(default_models_dir);
        dir.join(&self.filename)
    }
}

fn default_models_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Models")
}

/// Which compute device to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA when available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Everything `MeshGenerator` needs at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: ModelConfig,
    pub checkpoint: CheckpointConfig,
    pub device: DevicePreference,
    pub seed: u64,
    /// Distance of the input cameras from the origin.
    pub camera_radius: f32,
    /// Vertical field of view of the input cameras, in degrees.
    pub camera_fov: f32,
    /// Field of view the geometry extractor is set up with, in degrees.
    pub geometry_fovy: f32,
    /// Bake a UV texture map; otherwise export per-vertex colors.
    pub export_texture_map: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            checkpoint: CheckpointConfig::default(),
            device: DevicePreference::Auto,
            seed: 42,
            camera_radius: 4.0,
            camera_fov: 30.0,
            geometry_fovy: 30.0,
            export_texture_map: true,
        }
    }
}

impl GeneratorConfig {
    /// Load a configuration from a JSON file; missing fields keep defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| MeshGenError::Config(format!("{}: {}", path.display(), e)))?;
        config.model.validate()?;
        Ok(config)
    }
}
