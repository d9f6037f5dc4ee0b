pub mod reading;
pub mod orientation;
pub mod connection;
pub mod settings;

pub use reading::{Axes, RawReading};
pub use orientation::ProcessedOrientation;
pub use connection::{ConnectionState, LinkPhase};
pub use settings::{AngleRange, BatteryData, DeviceSettings, DeviceStatus, WifiCredentials, ZeroCalibration};
