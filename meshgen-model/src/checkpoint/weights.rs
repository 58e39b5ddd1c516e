//! Strict parameter source for candle's `VarBuilder`.
//!
//! [`CheckpointTensors`] serves a filtered state dict to the layer
//! constructors and remembers every name they ask for. Missing names and
//! shape mismatches fail inside `get`; once the network is built
//! [`CheckpointTensors::finish`] rejects whatever was never asked for.

use super::CheckpointError;
use candle_core::{DType, Device, Shape, Tensor};
use candle_nn::var_builder::SimpleBackend;
use candle_nn::{Init, VarBuilder};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

struct Inner {
    tensors: HashMap<String, Tensor>,
    requested: Mutex<BTreeSet<String>>,
}

/// A state dict that tracks which of its entries were read.
#[derive(Clone)]
pub struct CheckpointTensors {
    inner: Arc<Inner>,
}

impl CheckpointTensors {
    pub fn new(tensors: HashMap<String, Tensor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tensors,
                requested: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    /// A `VarBuilder` reading from these tensors, converting to `dtype` on `device`.
    pub fn var_builder(&self, dtype: DType, device: &Device) -> VarBuilder<'static> {
        VarBuilder::from_backend(Box::new(self.clone()), dtype, device.clone())
    }

    /// Names present in the state dict that were never requested, sorted.
    pub fn unused(&self) -> Vec<String> {
        let requested = self
            .inner
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut unused: Vec<String> = self
            .inner
            .tensors
            .keys()
            .filter(|k| !requested.contains(*k))
            .cloned()
            .collect();
        unused.sort();
        unused
    }

    /// Fail if any state dict entry was left unused.
    pub fn finish(&self) -> Result<(), CheckpointError> {
        let unused = self.unused();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(CheckpointError::UnexpectedParameters(unused))
        }
    }
}

fn wrap(err: CheckpointError) -> candle_core::Error {
    candle_core::Error::Wrapped(Box::new(err))
}

impl SimpleBackend for CheckpointTensors {
    fn get(
        &self,
        s: Shape,
        name: &str,
        _: Init,
        dtype: DType,
        dev: &Device,
    ) -> candle_core::Result<Tensor> {
        self.inner
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());

        let tensor = self
            .inner
            .tensors
            .get(name)
            .ok_or_else(|| wrap(CheckpointError::MissingParameter(name.to_string())))?;
        if tensor.dims() != s.dims() {
            return Err(wrap(CheckpointError::ShapeMismatch {
                name: name.to_string(),
                expected: s.dims().to_vec(),
                found: tensor.dims().to_vec(),
            }));
        }
        tensor.to_dtype(dtype)?.to_device(dev)
    }

    fn contains_tensor(&self, name: &str) -> bool {
        self.inner.tensors.contains_key(name)
    }
}

/// Recover a [`CheckpointError`] raised by [`CheckpointTensors`] from the
/// candle error the layer constructors hand back.
pub fn take_checkpoint_error(
    err: candle_core::Error,
) -> Result<CheckpointError, candle_core::Error> {
    match err {
        candle_core::Error::Wrapped(inner) => inner
            .downcast::<CheckpointError>()
            .map(|e| *e)
            .map_err(candle_core::Error::Wrapped),
        candle_core::Error::WithBacktrace { inner, .. } => take_checkpoint_error(*inner),
        other => Err(other),
    }
}

/// Build a network twice over a `VarMap`: once to create its parameters,
/// then again after drawing them all from `N(0, stddev)`. Returns the
/// network and its parameters by name.
#[cfg(test)]
pub(crate) fn random<T>(
    stddev: f32,
    build: impl Fn(VarBuilder) -> crate::error::Result<T>,
) -> (T, HashMap<String, Tensor>) {
    let varmap = candle_nn::VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    build(vb.clone()).unwrap();
    for var in varmap.all_vars() {
        let noise = Tensor::randn(0f32, stddev, var.shape(), var.device()).unwrap();
        var.set(&noise).unwrap();
    }
    let model = build(vb).unwrap();
    let params = varmap
        .data()
        .lock()
        .unwrap()
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();
    (model, params)
}
