//! Compute device selection.

use std::fmt;
use std::str::FromStr;

use candle_core::Device;
use tracing::{debug, info, warn};

use crate::error::{Ge2eError, Ge2eResult};

/// Which backend to run tensors on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// First compiled GPU backend that initializes, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Metal,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "metal" => Ok(Self::Metal),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(format!("Unknown device: {}", s)),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Metal => write!(f, "metal"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

fn try_metal() -> Result<Device, String> {
    if !cfg!(feature = "metal") {
        return Err("metal backend not compiled".to_string());
    }
    Device::new_metal(0).map_err(|e| format!("metal failed: {e}"))
}

fn try_cuda() -> Result<Device, String> {
    if !cfg!(feature = "cuda") {
        return Err("cuda backend not compiled".to_string());
    }
    Device::new_cuda(0).map_err(|e| format!("cuda failed: {e}"))
}

/// Resolves `preference` to a device.
///
/// `Auto` never fails: it falls back to CPU with a warning. An explicit GPU
/// request that cannot be honored is an error.
pub fn select_device(preference: DevicePreference) -> Ge2eResult<Device> {
    match preference {
        DevicePreference::Cpu => {
            debug!("Using CPU device");
            Ok(Device::Cpu)
        }
        DevicePreference::Metal => {
            let device = try_metal().map_err(Ge2eError::invalid)?;
            info!("Using Metal GPU acceleration");
            Ok(device)
        }
        DevicePreference::Cuda => {
            let device = try_cuda().map_err(Ge2eError::invalid)?;
            info!("Using CUDA GPU acceleration");
            Ok(device)
        }
        DevicePreference::Auto => {
            let mut failures = Vec::new();
            let attempts: [(&str, fn() -> Result<Device, String>); 2] =
                [("Metal", try_metal), ("CUDA", try_cuda)];
            for (name, attempt) in attempts {
                match attempt() {
                    Ok(device) => {
                        info!("Using {name} GPU acceleration");
                        return Ok(device);
                    }
                    Err(msg) => failures.push(msg),
                }
            }
            warn!(reason = %failures.join("; "), "Falling back to CPU device");
            Ok(Device::Cpu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_from_str() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!(" CPU ".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert!("tpu".parse::<DevicePreference>().is_err());
        assert_eq!(DevicePreference::Metal.to_string(), "metal");
    }

    #[test]
    fn test_cpu_is_always_available() {
        assert!(select_device(DevicePreference::Cpu).unwrap().is_cpu());
    }

    #[cfg(not(any(feature = "metal", feature = "cuda")))]
    #[test]
    fn test_auto_falls_back_to_cpu() {
        assert!(select_device(DevicePreference::Auto).unwrap().is_cpu());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_explicit_uncompiled_backend_is_an_error() {
        let err = select_device(DevicePreference::Cuda).unwrap_err();
        assert!(err.is_invalid_input());
    }
}
