//! Execution device selection and precision mapping

use candle_core::{DType, Device};
use tap_types::{Accelerator, Precision};
use tracing::{debug, warn};

/// Picks the execution device from an availability signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResolver {
    accelerator: Accelerator,
}

impl DeviceResolver {
    /// Use an explicit availability signal
    pub fn new(accelerator: Accelerator) -> Self {
        Self { accelerator }
    }

    /// Resolver that always answers with the host device
    pub fn cpu_only() -> Self {
        Self::new(Accelerator::None)
    }

    /// Probe the accelerators compiled into the tensor backend
    pub fn probe() -> Self {
        let accelerator = if candle_core::utils::cuda_is_available() {
            Accelerator::Cuda
        } else if candle_core::utils::metal_is_available() {
            Accelerator::Metal
        } else {
            Accelerator::None
        };
        debug!("Detected accelerator: {}", accelerator);
        Self { accelerator }
    }

    pub fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    /// Device bound to `preferred_index` when an accelerator is present,
    /// otherwise the host device whatever the index. Never fails: a device
    /// that cannot be opened falls back to the host.
    pub fn resolve(&self, preferred_index: usize) -> Device {
        let opened = match self.accelerator {
            Accelerator::None => return Device::Cpu,
            Accelerator::Cuda => Device::new_cuda(preferred_index),
            Accelerator::Metal => Device::new_metal(preferred_index),
        };
        opened.unwrap_or_else(|e| {
            warn!(
                "Failed to open {} device {}, falling back to cpu: {}",
                self.accelerator, preferred_index, e
            );
            Device::Cpu
        })
    }
}

impl Default for DeviceResolver {
    fn default() -> Self {
        Self::probe()
    }
}

/// Resolve a device using the probed availability signal
pub fn resolve_device(preferred_index: usize) -> Device {
    DeviceResolver::probe().resolve(preferred_index)
}

/// Tensor dtype for a precision
pub fn precision_dtype(precision: Precision) -> DType {
    match precision {
        Precision::Float16 => DType::F16,
        Precision::BFloat16 => DType::BF16,
        Precision::Float32 => DType::F32,
    }
}

/// Human-readable device name
pub fn device_label(device: &Device) -> String {
    match device.location() {
        candle_core::DeviceLocation::Cpu => "cpu".to_string(),
        candle_core::DeviceLocation::Cuda { gpu_id } => format!("cuda:{}", gpu_id),
        candle_core::DeviceLocation::Metal { gpu_id } => format!("metal:{}", gpu_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_accelerator_falls_back_to_cpu() {
        let resolver = DeviceResolver::cpu_only();
        assert!(resolver.resolve(0).is_cpu());
        assert!(resolver.resolve(5).is_cpu());
    }

    #[test]
    fn precision_to_dtype() {
        assert_eq!(precision_dtype(Precision::Float16), DType::F16);
        assert_eq!(precision_dtype(Precision::BFloat16), DType::BF16);
        assert_eq!(precision_dtype(Precision::Float32), DType::F32);
    }

    #[test]
    fn cpu_label() {
        assert_eq!(device_label(&Device::Cpu), "cpu");
    }
}
