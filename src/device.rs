//! Compute device selection and one-time backend initialization

use candle_core::Device;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::DevicePreference;
use crate::error::Result;

static AUTOTUNE: OnceCell<()> = OnceCell::new();

/// Resolve a device preference to a concrete device.
///
/// `Auto` never fails: if CUDA cannot be initialized the CPU is used.
pub fn select_device(preference: DevicePreference) -> Result<Device> {
    let device = match preference {
        DevicePreference::Auto => match Device::cuda_if_available(0) {
            Ok(device) => device,
            Err(err) => {
                warn!("CUDA init failed ({err}); falling back to CPU");
                Device::Cpu
            }
        },
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda(ordinal) => Device::new_cuda(ordinal)?,
        DevicePreference::Metal(ordinal) => Device::new_metal(ordinal)?,
    };
    info!("Training device: {}", describe(&device));
    Ok(device)
}

/// Whether the device is an accelerator rather than the host CPU
pub fn is_accelerator(device: &Device) -> bool {
    !device.is_cpu()
}

/// Enable backend autotuning for the whole process.
///
/// With the `cuda` feature this switches f32 matrix multiplies to reduced
/// precision, so results differ slightly from full-precision runs.
///
/// Idempotent: only the first call touches backend state. Called by trainer
/// construction when an accelerator is selected.
pub fn enable_autotune() {
    AUTOTUNE.get_or_init(|| {
        #[cfg(feature = "cuda")]
        candle_core::cuda::set_gemm_reduced_precision_f32(true);
        info!("Backend autotuning enabled");
    });
}

/// Whether `enable_autotune` has run in this process
pub fn autotune_enabled() -> bool {
    AUTOTUNE.get().is_some()
}

/// Short human readable device name
pub fn describe(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}
