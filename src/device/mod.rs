pub mod api;
pub mod monitor;

pub use api::{ApiError, DeviceApi};
pub use monitor::{check_device, DeviceMonitor};
