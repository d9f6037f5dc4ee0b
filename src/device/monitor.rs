use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::device::api::DeviceApi;
use crate::types::{BatteryData, DeviceStatus};
use crate::utils::now_millis;

/// 定期读取电量，同时判断设备 HTTP 接口是否可达
pub struct DeviceMonitor {
    status_rx: watch::Receiver<DeviceStatus>,
    task: JoinHandle<()>,
}

impl DeviceMonitor {
    /// 立即检查一次，之后每 `poll_interval` 检查一次
    pub fn spawn(api: DeviceApi, poll_interval: Duration) -> Self {
        let (status_tx, status_rx) = watch::channel(DeviceStatus::default());
        let task = tokio::spawn(poll_loop(api, poll_interval, status_tx));
        Self { status_rx, task }
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status_rx.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 单次检查
pub async fn check_device(api: &DeviceApi) -> DeviceStatus {
    match api.battery().await {
        Ok(battery) => {
            debug!("Battery {:.0}% ({:.2} V)", battery.percentage, battery.voltage);
            DeviceStatus {
                reachable: true,
                battery,
                checked_at: now_millis(),
            }
        }
        Err(e) => {
            warn!("Device API unreachable: {}", e);
            DeviceStatus {
                reachable: false,
                battery: BatteryData::default(),
                checked_at: now_millis(),
            }
        }
    }
}

async fn poll_loop(api: DeviceApi, poll_interval: Duration, status_tx: watch::Sender<DeviceStatus>) {
    let mut ticker = interval(poll_interval);
    loop {
        // 第一次 tick 立即返回
        ticker.tick().await;
        let status = check_device(&api).await;
        status_tx.send_replace(status);
    }
}
