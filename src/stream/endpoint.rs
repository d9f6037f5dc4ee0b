use reqwest::Url;

use crate::config::{ConfigError, DeviceConfig};

/// 设备地址：流端点（ws/wss）和 HTTP 接口根地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    secure: bool,
    /// 主机名（不含端口），流端点使用
    hostname: String,
    /// 主机（可含端口），HTTP 接口使用
    host: String,
    stream_port: u16,
}

impl DeviceEndpoint {
    /// 协议跟随页面；调试地址非空时替代页面主机
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ConfigError> {
        let page = Url::parse(&config.page_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.page_url, e)))?;
        let secure = page.scheme() == "https";

        let debug_host = config.debug_host.trim();
        let (hostname, host) = if !debug_host.is_empty() {
            (debug_host.to_string(), debug_host.to_string())
        } else {
            let hostname = page
                .host_str()
                .ok_or_else(|| ConfigError::InvalidUrl(format!("{} has no host", config.page_url)))?
                .to_string();
            let host = match page.port() {
                Some(port) => format!("{}:{}", hostname, port),
                None => hostname.clone(),
            };
            (hostname, host)
        };

        Ok(Self {
            secure,
            hostname,
            host,
            stream_port: config.stream_port,
        })
    }

    pub fn stream_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.hostname, self.stream_port)
    }

    pub fn api_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}/", scheme, self.host)
    }
}
