pub mod device;
pub mod manager;
pub mod precision;
pub mod scaler;

pub use device::{Device, DeviceRequest};
pub use manager::{ForwardPass, PrecisionManager, StepOutcome};
pub use precision::Precision;
pub use scaler::{GradScaler, ScalerConfig};
