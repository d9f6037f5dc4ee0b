//! 倾角仪设备客户端
//!
//! 通过 WebSocket 接收设备的实时读数，清洗后计算姿态角，并通过
//! HTTP 接口读写设备配置。

pub mod config;
pub mod device;
pub mod logger;
pub mod orientation;
pub mod rate;
pub mod stream;
pub mod types;
pub mod utils;

pub use config::{AppConfig, ConfigError};
pub use orientation::{cardinal_direction, process, Cardinal};
pub use rate::{HealthWatch, LinkHealth, RateTracker};
pub use stream::{StreamClient, StreamConfig};
pub use types::{Axes, ConnectionState, LinkPhase, ProcessedOrientation, RawReading};
