use candle_core::{DType, Device};
use tracing::{info, warn};

use crate::config::{DTypePreference, DevicePreference};
use crate::error::Result;

/// Auto picks the first CUDA device when one is usable, else the CPU.
pub fn select_device(preference: DevicePreference) -> Result<Device> {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => Device::new_cuda(0)?,
        DevicePreference::Auto => {
            let device = Device::cuda_if_available(0)?;
            if device.is_cpu() {
                warn!("No CUDA device available, running on CPU");
            }
            device
        }
    };
    info!(device = describe(&device), "Selected compute device");
    Ok(device)
}

/// Half precision on accelerators, full precision on CPU.
pub fn select_dtype(preference: DTypePreference, device: &Device) -> DType {
    match preference {
        DTypePreference::Auto if device.is_cpu() => DType::F32,
        DTypePreference::Auto => DType::F16,
        DTypePreference::F32 => DType::F32,
        DTypePreference::F16 => DType::F16,
        DTypePreference::Bf16 => DType::BF16,
    }
}

pub fn describe(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

/// Additive mask value for a masked-out attention score.
pub fn mask_value(dtype: DType) -> f64 {
    match dtype {
        DType::F16 => -65504.0,
        _ => -1e9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_preference_is_honoured() {
        let device = select_device(DevicePreference::Cpu).unwrap();
        assert!(device.is_cpu());
        assert_eq!(describe(&device), "cpu");
    }

    #[test]
    fn auto_dtype_follows_device() {
        assert_eq!(select_dtype(DTypePreference::Auto, &Device::Cpu), DType::F32);
        assert_eq!(select_dtype(DTypePreference::Bf16, &Device::Cpu), DType::BF16);
    }
}
