//! # Device Selection
//!
//! Picks the compute device (CPU/GPU) the speech model is loaded onto.
//! Whatever device is chosen, weights stay in `F32`; there is no half
//! precision path, so results match across hardware.

use candle_core::Device;
use tracing::{debug, info};

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    Auto,
    /// Force CPU usage
    #[default]
    Cpu,
    /// CUDA GPU (falls back to CPU if not available)
    Cuda,
    /// Metal GPU (falls back to CPU if not available)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Device detection and selection utilities
pub struct DeviceManager;

impl DeviceManager {
    /// Resolve a preference to a concrete device, falling back to CPU.
    pub fn get_device(preference: DevicePreference) -> Device {
        let device = match preference {
            DevicePreference::Auto => Self::detect_best_device(),
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Self::get_cuda_device().unwrap_or(Device::Cpu),
            DevicePreference::Metal => Self::get_metal_device().unwrap_or(Device::Cpu),
        };
        info!(
            preference = ?preference,
            device = %Self::get_device_info(&device),
            "Selected inference device"
        );
        device
    }

    fn detect_best_device() -> Device {
        if let Some(cuda_device) = Self::get_cuda_device() {
            return cuda_device;
        }
        if let Some(metal_device) = Self::get_metal_device() {
            return metal_device;
        }
        Device::Cpu
    }

    fn get_cuda_device() -> Option<Device> {
        match Device::new_cuda(0) {
            Ok(device) => Some(device),
            Err(e) => {
                debug!("CUDA not available: {}", e);
                None
            }
        }
    }

    fn get_metal_device() -> Option<Device> {
        match Device::new_metal(0) {
            Ok(device) => Some(device),
            Err(e) => {
                debug!("Metal not available: {}", e);
                None
            }
        }
    }

    /// Short device label for logs.
    pub fn get_device_info(device: &Device) -> &'static str {
        match device {
            Device::Cpu => "CPU",
            Device::Cuda(_) => "CUDA GPU",
            Device::Metal(_) => "Metal GPU",
        }
    }
}
