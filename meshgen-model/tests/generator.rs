//! End-to-end tests of generator construction and generation with a small
//! randomly initialized model.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use image::{Rgb, RgbImage};
use meshgen_model::checkpoint::CheckpointError;
use meshgen_model::config::EncoderConfig;
use meshgen_model::{
    CheckpointConfig, CheckpointFetcher, DevicePreference, GeneratorConfig, LrmMesh, MeshGenError,
    MeshGenerator, ModelConfig,
};
use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT: &str = "tiny.safetensors";

fn tiny_model() -> ModelConfig {
    ModelConfig {
        encoder: EncoderConfig {
            hidden_size: 8,
            num_layers: 1,
            num_heads: 2,
            intermediate_size: 16,
            patch_size: 16,
            pretrain_image_size: 32,
            ..EncoderConfig::default()
        },
        transformer_dim: 12,
        transformer_layers: 1,
        transformer_heads: 2,
        triplane_low_res: 2,
        triplane_high_res: 4,
        triplane_dim: 3,
        grid_res: 8,
        decoder_hidden_dim: 4,
        ..ModelConfig::default()
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("meshgen-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(dir: &Path) -> GeneratorConfig {
    GeneratorConfig {
        model: tiny_model(),
        checkpoint: CheckpointConfig {
            filename: CHECKPOINT.to_string(),
            models_dir: Some(dir.join("Models")),
            ..CheckpointConfig::default()
        },
        device: DevicePreference::Cpu,
        ..GeneratorConfig::default()
    }
}

/// The generator's parameters under the training checkpoint's namespace.
fn random_state_dict() -> HashMap<String, Tensor> {
    let varmap = VarMap::new();
    LrmMesh::new(
        &tiny_model(),
        VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu),
    )
    .unwrap();
    let vars = varmap.data().lock().unwrap();
    vars.iter()
        .map(|(name, var)| {
            let value = Tensor::randn(0f32, 0.1, var.shape(), &Device::Cpu).unwrap();
            (format!("lrm_generator.{name}"), value)
        })
        .collect()
}

fn save(tensors: &HashMap<String, Tensor>, path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    candle_core::safetensors::save(tensors, path).unwrap();
}

/// Serves a prepared checkpoint file and counts requests.
struct CopyFetcher {
    source: PathBuf,
    calls: Cell<usize>,
}

impl CheckpointFetcher for CopyFetcher {
    fn fetch(
        &self,
        repo_id: &str,
        filename: &str,
        destination: &Path,
    ) -> Result<(), CheckpointError> {
        assert_eq!(repo_id, "TencentARC/InstantMesh");
        assert_eq!(filename, CHECKPOINT);
        self.calls.set(self.calls.get() + 1);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&self.source, destination)?;
        Ok(())
    }
}

/// For setups where the checkpoint is already cached.
struct OfflineFetcher;

impl CheckpointFetcher for OfflineFetcher {
    fn fetch(&self, _: &str, _: &str, _: &Path) -> Result<(), CheckpointError> {
        Err(CheckpointError::Download {
            url: "offline".to_string(),
            reason: "no network in tests".to_string(),
        })
    }
}

fn views() -> Vec<RgbImage> {
    (0..6)
        .map(|i| {
            RgbImage::from_fn(320, 320, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, (i * 40) as u8])
            })
        })
        .collect()
}

fn cached_generator(name: &str, texture: bool) -> (MeshGenerator, PathBuf) {
    let dir = temp_dir(name);
    let mut config = config(&dir);
    config.export_texture_map = texture;
    save(&random_state_dict(), &config.checkpoint.local_path());
    let generator = MeshGenerator::with_fetcher(&config, &OfflineFetcher).unwrap();
    (generator, dir)
}

#[test]
fn test_checkpoint_is_fetched_once() {
    let dir = temp_dir("fetch-once");
    let source = dir.join("hub").join(CHECKPOINT);
    save(&random_state_dict(), &source);
    let config = config(&dir);
    let fetcher = CopyFetcher {
        source,
        calls: Cell::new(0),
    };

    MeshGenerator::with_fetcher(&config, &fetcher).unwrap();
    assert_eq!(fetcher.calls.get(), 1);
    assert!(config.checkpoint.local_path().exists());

    MeshGenerator::with_fetcher(&config, &fetcher).unwrap();
    assert_eq!(fetcher.calls.get(), 1);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_download_failure_propagates() {
    let dir = temp_dir("offline");
    let err = MeshGenerator::with_fetcher(&config(&dir), &OfflineFetcher)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        MeshGenError::Checkpoint(CheckpointError::Download { .. })
    ));
    fs::remove_dir_all(dir).unwrap();
}

fn load_error(name: &str, tensors: HashMap<String, Tensor>) -> CheckpointError {
    let dir = temp_dir(name);
    let config = config(&dir);
    save(&tensors, &config.checkpoint.local_path());
    let err = MeshGenerator::with_fetcher(&config, &OfflineFetcher)
        .err()
        .unwrap();
    fs::remove_dir_all(dir).unwrap();
    match err {
        MeshGenError::Checkpoint(e) => e,
        other => panic!("expected a checkpoint error, got {other}"),
    }
}

#[test]
fn test_rejects_checkpoint_without_generator_prefix() {
    let tensors = random_state_dict()
        .into_iter()
        .map(|(name, t)| (name.replace("lrm_generator.", "model."), t))
        .collect();
    assert!(matches!(
        load_error("no-prefix", tensors),
        CheckpointError::NoMatchingPrefix(prefix) if prefix == "lrm_generator."
    ));
}

#[test]
fn test_rejects_missing_parameter() {
    let mut tensors = random_state_dict();
    tensors.remove("lrm_generator.transformer.norm.bias");
    assert!(matches!(
        load_error("missing", tensors),
        CheckpointError::MissingParameter(name) if name == "transformer.norm.bias"
    ));
}

#[test]
fn test_rejects_unexpected_parameter() {
    let mut tensors = random_state_dict();
    tensors.insert(
        "lrm_generator.encoder.model.pooler.dense.bias".to_string(),
        Tensor::zeros(8, DType::F32, &Device::Cpu).unwrap(),
    );
    // Other namespaces of the training checkpoint are ignored.
    tensors.insert(
        "discriminator.bias".to_string(),
        Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap(),
    );
    assert!(matches!(
        load_error("unexpected", tensors),
        CheckpointError::UnexpectedParameters(names)
            if names == vec!["encoder.model.pooler.dense.bias".to_string()]
    ));
}

#[test]
fn test_rejects_wrong_shape() {
    let mut tensors = random_state_dict();
    tensors.insert(
        "lrm_generator.transformer.pos_embed".to_string(),
        Tensor::zeros((1, 3 * 4, 10), DType::F32, &Device::Cpu).unwrap(),
    );
    match load_error("shape", tensors) {
        CheckpointError::ShapeMismatch {
            name,
            expected,
            found,
        } => {
            assert_eq!(name, "transformer.pos_embed");
            assert_eq!(expected, vec![1, 12, 12]);
            assert_eq!(found, vec![1, 12, 10]);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_generate_writes_textured_obj() {
    let (generator, dir) = cached_generator("textured", true);
    let output = dir.join("out").join("mesh.obj");
    generator.generate(&views(), 32, &output).unwrap();

    let obj = fs::read_to_string(&output).unwrap();
    assert!(obj.starts_with("mtllib mesh.mtl\n"));
    assert!(obj.lines().any(|l| l.starts_with("v ")));
    assert!(obj.lines().any(|l| l.starts_with("vt ")));
    assert!(obj.lines().any(|l| l.starts_with("f ") && l.contains('/')));

    let mtl = fs::read_to_string(dir.join("out").join("mesh.mtl")).unwrap();
    assert!(mtl.contains("map_Kd mesh.png"));
    let png = image::open(dir.join("out").join("mesh.png")).unwrap();
    assert_eq!((png.width(), png.height()), (32, 32));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_generate_vertex_colors() {
    let (generator, dir) = cached_generator("colored", false);
    let output = dir.join("colored.obj");
    generator.generate(&views(), 16, &output).unwrap();

    let obj = fs::read_to_string(&output).unwrap();
    let vertex = obj.lines().find(|l| l.starts_with("v ")).unwrap();
    assert_eq!(vertex.split_whitespace().count(), 7);
    assert!(!dir.join("colored.mtl").exists());

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_generate_is_deterministic() {
    let (generator, dir) = cached_generator("deterministic", true);
    let (a, b) = (dir.join("a.obj"), dir.join("b.obj"));
    generator.generate(&views(), 16, &a).unwrap();
    generator.generate(&views(), 16, &b).unwrap();

    let strip = |s: String| s.replace("a.mtl", "").replace("b.mtl", "");
    assert_eq!(
        strip(fs::read_to_string(&a).unwrap()),
        strip(fs::read_to_string(&b).unwrap())
    );
    assert_eq!(
        fs::read(dir.join("a.png")).unwrap(),
        fs::read(dir.join("b.png")).unwrap()
    );

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_invalid_views_are_rejected() {
    let (generator, dir) = cached_generator("invalid", true);
    let mut images = views();
    images.pop();
    assert!(matches!(
        generator.generate(&images, 16, &dir.join("x.obj")),
        Err(MeshGenError::InvalidViewCount { expected: 6, found: 5 })
    ));
    assert!(!dir.join("x.obj").exists());
    fs::remove_dir_all(dir).unwrap();
}
