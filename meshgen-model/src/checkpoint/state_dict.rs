//! Reading checkpoint files into named tensors.

use super::CheckpointError;
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Read every tensor of a checkpoint onto the CPU.
///
/// `.safetensors` files are read directly. Anything else is treated as a
/// PyTorch pickle archive whose tensors sit under `key` (for example the
/// `state_dict` entry of a Lightning checkpoint); an empty key reads the top
/// level.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_state_dict(path: &Path, key: &str) -> Result<HashMap<String, Tensor>, CheckpointError> {
    let is_safetensors = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("safetensors"));

    let tensors = if is_safetensors {
        candle_core::safetensors::load(path, &Device::Cpu)
    } else {
        let key = (!key.is_empty()).then_some(key);
        candle_core::pickle::read_all_with_key(path, key)
            .map(|tensors| tensors.into_iter().collect())
    }
    .map_err(|source| CheckpointError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Read {} tensors from checkpoint", tensors.len());
    Ok(tensors)
}

/// Keep the tensors whose name starts with `prefix`, with the prefix removed.
///
/// Fails when nothing matches, which means the file holds some other model.
pub fn strip_prefix(
    tensors: HashMap<String, Tensor>,
    prefix: &str,
) -> Result<HashMap<String, Tensor>, CheckpointError> {
    let total = tensors.len();
    let kept: HashMap<String, Tensor> = tensors
        .into_iter()
        .filter_map(|(name, t)| name.strip_prefix(prefix).map(|rest| (rest.to_string(), t)))
        .collect();

    if kept.is_empty() {
        return Err(CheckpointError::NoMatchingPrefix(prefix.to_string()));
    }
    debug!(
        "Kept {} of {} tensors under prefix {:?}",
        kept.len(),
        total,
        prefix
    );
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor() -> Tensor {
        Tensor::zeros(2, candle_core::DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_strip_prefix_drops_other_namespaces() {
        let mut tensors = HashMap::new();
        tensors.insert("lrm_generator.encoder.w".to_string(), tensor());
        tensors.insert("lrm_generator.transformer.norm.weight".to_string(), tensor());
        tensors.insert("discriminator.w".to_string(), tensor());

        let kept = strip_prefix(tensors, "lrm_generator.").unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.contains_key("encoder.w"));
        assert!(kept.contains_key("transformer.norm.weight"));
    }

    #[test]
    fn test_strip_prefix_rejects_foreign_checkpoint() {
        let mut tensors = HashMap::new();
        tensors.insert("encoder.w".to_string(), tensor());
        assert!(matches!(
            strip_prefix(tensors, "lrm_generator."),
            Err(CheckpointError::NoMatchingPrefix(_))
        ));
    }

    #[test]
    fn test_safetensors_round_trip_through_reader() {
        let dir = std::env::temp_dir().join(format!("meshgen-sd-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("weights.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            "lrm_generator.a".to_string(),
            Tensor::new(&[1f32, 2.0, 3.0], &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let read = read_state_dict(&path, "state_dict").unwrap();
        let a = read["lrm_generator.a"].to_vec1::<f32>().unwrap();
        assert_eq!(a, vec![1.0, 2.0, 3.0]);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_unreadable_checkpoint_reports_path() {
        let dir = std::env::temp_dir().join(format!("meshgen-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.ckpt");
        std::fs::write(&path, b"not a checkpoint").unwrap();

        let err = read_state_dict(&path, "state_dict").unwrap_err();
        assert!(matches!(err, CheckpointError::Read { .. }));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
