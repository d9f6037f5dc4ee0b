use std::time::Duration;

use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::{AppConfig, ConfigError};
use crate::stream::endpoint::DeviceEndpoint;
use crate::types::{AngleRange, BatteryData, DeviceSettings, WifiCredentials, ZeroCalibration};

/// 设备 HTTP 接口错误
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP error! status: {0}")]
    Status(StatusCode),
    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// 设备配置接口
///
/// 固件只接受 GET，参数走查询字符串。响应为 204 或不是 JSON 时返回实体默认值。
#[derive(Debug, Clone)]
pub struct DeviceApi {
    client: reqwest::Client,
    base_url: String,
}

impl DeviceApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("LevelHub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let endpoint = DeviceEndpoint::from_config(&config.device)?;
        Self::new(&endpoint.api_base(), Duration::from_secs(config.device.request_timeout_secs))
            .map_err(|e| ConfigError::Validation(format!("HTTP client: {}", e)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        debug!("API request: {}", url);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.get(path, &[]).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);
        if !is_json {
            return Ok(T::default());
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_unit(&self, path: &str, query: &[(&str, String)]) -> Result<(), ApiError> {
        self.get(path, query).await.map(|_| ())
    }

    pub async fn settings(&self) -> Result<DeviceSettings, ApiError> {
        self.get_json("/settings").await
    }

    pub async fn battery(&self) -> Result<BatteryData, ApiError> {
        self.get_json("/battery").await
    }

    /// 以当前姿态为零点，返回新的偏移量
    pub async fn calibrate_zero(&self) -> Result<ZeroCalibration, ApiError> {
        let result: ZeroCalibration = self.get_json("/calibrate_zero").await?;
        info!("Zero calibrated, offset {:.2}°", result.offset);
        Ok(result)
    }

    pub async fn set_zero_offset(&self, offset: f64) -> Result<(), ApiError> {
        self.get_unit("/set_zero_offset", &[("offset", offset.to_string())]).await
    }

    pub async fn set_axis_swap(&self, swap: bool) -> Result<(), ApiError> {
        self.get_unit("/set_axis_swap", &[("swap", swap.to_string())]).await
    }

    pub async fn set_level_range(&self, range: AngleRange) -> Result<(), ApiError> {
        if range.min > range.max {
            return Err(ApiError::InvalidInput(format!(
                "level range min {} is above max {}",
                range.min, range.max
            )));
        }
        self.get_unit(
            "/set_level_range",
            &[("min", range.min.to_string()), ("max", range.max.to_string())],
        )
        .await
    }

    /// 保存后设备会重启
    pub async fn set_wifi(&self, credentials: &WifiCredentials) -> Result<(), ApiError> {
        if !credentials.is_complete() {
            return Err(ApiError::InvalidInput("Please fill in all fields".to_string()));
        }
        self.get_unit(
            "/set_wifi",
            &[
                ("ssid", credentials.ssid.clone()),
                ("pass", credentials.password.clone()),
                ("ip", credentials.ip.clone()),
                ("gateway", credentials.gateway.clone()),
            ],
        )
        .await?;
        info!("WiFi configuration saved, device is restarting");
        Ok(())
    }

    /// 清除后设备以 AP 模式重启
    pub async fn clear_credentials(&self) -> Result<(), ApiError> {
        self.get_unit("/clear_credentials", &[]).await?;
        info!("WiFi credentials cleared, device is restarting in AP mode");
        Ok(())
    }
}
