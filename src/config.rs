//! 应用配置管理模块
//! 集中管理所有配置项，提供默认值和配置验证

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "LEVELHUB_CONFIG";
/// 调试用设备地址，覆盖页面主机
pub const DEBUG_HOST_ENV: &str = "LEVELHUB_DEBUG_IP";
/// 页面地址覆盖
pub const PAGE_URL_ENV: &str = "LEVELHUB_PAGE_URL";
pub const DEFAULT_CONFIG_PATH: &str = "levelhub.toml";

/// 主配置结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub reconnect: ReconnectConfig,
    pub health: HealthConfig,
    pub channels: ChannelConfig,
}

/// 设备地址配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// 托管页面的地址，决定协议（http/https）和默认主机
    pub page_url: String,
    /// 非空时替代页面主机
    pub debug_host: String,
    pub stream_port: u16,
    pub request_timeout_secs: u64,
}

/// 重连配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

/// 链路健康配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub rate_window_ms: u64,
    pub low_rate_threshold: u32,
    pub poll_interval_secs: u64,
}

/// 通道配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub reading_channel_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            page_url: "http://192.168.4.1".to_string(),
            debug_host: String::new(),
            stream_port: 81,
            request_timeout_secs: 10,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            backoff_factor: 1.5,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            rate_window_ms: 1000,
            low_rate_threshold: 3, // 设备正常约 5 msg/s
            poll_interval_secs: 30,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reading_channel_capacity: 256,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 文件不存在时使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// 按环境变量加载：`LEVELHUB_CONFIG` 指定文件，
    /// `LEVELHUB_DEBUG_IP` / `LEVELHUB_PAGE_URL` 覆盖对应项
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = config_path();
        let mut config = Self::load_or_default(&path)?;
        config.apply_overrides(
            std::env::var(DEBUG_HOST_ENV).ok(),
            std::env::var(PAGE_URL_ENV).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, debug_host: Option<String>, page_url: Option<String>) {
        if let Some(host) = debug_host.filter(|h| !h.trim().is_empty()) {
            self.device.debug_host = host.trim().to_string();
        }
        if let Some(url) = page_url.filter(|u| !u.trim().is_empty()) {
            self.device.page_url = url.trim().to_string();
        }
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.device.page_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.device.page_url, e)))?;

        if self.device.stream_port == 0 {
            return Err(ConfigError::Validation("Stream port must be non-zero".to_string()));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Validation("Reconnect base delay must be positive".to_string()));
        }

        if !(self.reconnect.backoff_factor >= 1.0) {
            return Err(ConfigError::Validation("Backoff factor must be at least 1.0".to_string()));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ConfigError::Validation(
                "Maximum reconnect delay must not be below the base delay".to_string(),
            ));
        }

        if self.health.rate_window_ms == 0 || self.health.poll_interval_secs == 0 {
            return Err(ConfigError::Validation("Health intervals must be positive".to_string()));
        }

        if self.channels.reading_channel_capacity == 0 {
            return Err(ConfigError::Validation("Reading channel capacity must be positive".to_string()));
        }

        Ok(())
    }
}

/// 配置文件路径
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid page URL: {0}")]
    InvalidUrl(String),
}
