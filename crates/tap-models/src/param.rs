//! Named parameters with deferred storage
//!
//! Factories declare every parameter by shape and initializer without
//! allocating it. Storage appears when a checkpoint value is assigned or when
//! the parameter is materialized; until then device and dtype casts only
//! update the declaration.
//!
//! Random initializers carry a seed fixed at declaration, so a deferred
//! parameter reads back the same values every time, and copies of it agree.

use candle_core::{DType, Device, Shape, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicU64, Ordering};
use tap_types::{Result, TapError};

static NEXT_SEED: AtomicU64 = AtomicU64::new(0x5eed);

/// How a parameter is filled when it is materialized without a checkpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Zeros,
    Ones,
    /// Zero-mean normal distribution, drawn from a seeded generator
    Normal { std: f64, seed: u64 },
}

/// One learnable parameter or buffer
#[derive(Debug, Clone)]
pub struct Param {
    shape: Shape,
    init: Init,
    dtype: DType,
    device: Device,
    value: Option<Tensor>,
}

impl Param {
    /// Declare a parameter (f32, host) without allocating it
    pub fn new(dims: &[usize], init: Init) -> Self {
        Self {
            shape: Shape::from_dims(dims),
            init,
            dtype: DType::F32,
            device: Device::Cpu,
            value: None,
        }
    }

    pub fn zeros(dims: &[usize]) -> Self {
        Self::new(dims, Init::Zeros)
    }

    pub fn ones(dims: &[usize]) -> Self {
        Self::new(dims, Init::Ones)
    }

    /// Normal initializer with a fresh process-unique seed
    pub fn normal(dims: &[usize], std: f64) -> Self {
        let seed = NEXT_SEED.fetch_add(1, Ordering::Relaxed);
        Self::seeded_normal(dims, std, seed)
    }

    pub fn seeded_normal(dims: &[usize], std: f64, seed: u64) -> Self {
        Self::new(dims, Init::Normal { std, seed })
    }

    /// Wrap an existing tensor
    pub fn from_tensor(tensor: Tensor) -> Self {
        Self {
            shape: tensor.shape().clone(),
            init: Init::Zeros,
            dtype: tensor.dtype(),
            device: tensor.device().clone(),
            value: Some(tensor),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn init(&self) -> Init {
        self.init
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Whether the parameter holds storage
    pub fn is_materialized(&self) -> bool {
        self.value.is_some()
    }

    /// Stored tensor, if any
    pub fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    /// Current value; deferred parameters are generated from their
    /// initializer, with identical results on every call
    pub fn tensor(&self) -> Result<Tensor> {
        match &self.value {
            Some(tensor) => Ok(tensor.clone()),
            None => self.initial_value(),
        }
    }

    /// Allocate storage from the initializer if none exists yet
    pub fn materialize(&mut self) -> Result<()> {
        if self.value.is_none() {
            self.value = Some(self.initial_value()?);
        }
        Ok(())
    }

    /// Assign a value, converting it to this parameter's dtype and device
    pub fn set(&mut self, tensor: Tensor) -> Result<()> {
        if tensor.dims() != self.dims() {
            return Err(TapError::model(format!(
                "shape mismatch: expected {:?}, got {:?}",
                self.dims(),
                tensor.dims()
            )));
        }
        let tensor = tensor
            .to_device(&self.device)
            .and_then(|t| t.to_dtype(self.dtype))
            .map_err(|e| TapError::model(format!("Failed to assign parameter: {}", e)))?;
        self.value = Some(tensor);
        Ok(())
    }

    pub fn to_device(&mut self, device: &Device) -> Result<()> {
        if let Some(tensor) = &self.value {
            let moved = tensor
                .to_device(device)
                .map_err(|e| TapError::device(format!("to_device failed: {}", e)))?;
            self.value = Some(moved);
        }
        self.device = device.clone();
        Ok(())
    }

    pub fn to_dtype(&mut self, dtype: DType) -> Result<()> {
        if let Some(tensor) = &self.value {
            let cast = tensor
                .to_dtype(dtype)
                .map_err(|e| TapError::model(format!("to_dtype failed: {}", e)))?;
            self.value = Some(cast);
        }
        self.dtype = dtype;
        Ok(())
    }

    /// Copy with freshly allocated storage
    pub fn deep_copy(&self) -> Result<Self> {
        let value = match &self.value {
            Some(tensor) => Some(
                tensor
                    .copy()
                    .map_err(|e| TapError::model(format!("Tensor copy failed: {}", e)))?,
            ),
            None => None,
        };
        Ok(Self {
            shape: self.shape.clone(),
            init: self.init,
            dtype: self.dtype,
            device: self.device.clone(),
            value,
        })
    }

    fn initial_value(&self) -> Result<Tensor> {
        let tensor = match self.init {
            Init::Zeros => Tensor::zeros(self.shape.clone(), self.dtype, &self.device),
            Init::Ones => Tensor::ones(self.shape.clone(), self.dtype, &self.device),
            Init::Normal { std, seed } => {
                let normal = Normal::new(0f32, std as f32).map_err(|e| {
                    TapError::model(format!("invalid normal std {}: {}", std, e))
                })?;
                let mut rng = StdRng::seed_from_u64(seed);
                let data: Vec<f32> = (0..self.elem_count())
                    .map(|_| normal.sample(&mut rng))
                    .collect();
                Tensor::from_vec(data, self.shape.clone(), &Device::Cpu)
                    .and_then(|t| t.to_device(&self.device))
                    .and_then(|t| t.to_dtype(self.dtype))
            }
        };
        tensor.map_err(|e| {
            TapError::model(format!("Failed to initialize {:?} parameter: {}", self.dims(), e))
        })
    }
}
