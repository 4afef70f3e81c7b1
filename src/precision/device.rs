use serde::{Serialize, Deserialize};
use std::fmt;

use crate::error::{Result, TrainError};

/// Device requested in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRequest {
    /// GPU when one is available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Device the run actually computes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    /// Whether an accelerator backend is usable. This build ships the CPU
    /// kernels only.
    pub fn gpu_available() -> bool {
        false
    }

    pub fn resolve(request: DeviceRequest) -> Result<Device> {
        match request {
            DeviceRequest::Auto if Device::gpu_available() => Ok(Device::Gpu),
            DeviceRequest::Auto | DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Gpu if Device::gpu_available() => Ok(Device::Gpu),
            DeviceRequest::Gpu => Err(TrainError::config("device 'gpu' requested but no GPU backend is available")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
