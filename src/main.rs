use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use dotenv::dotenv;
use log::{error, info, warn};
use tokio::sync::watch;

use levelhub::config::AppConfig;
use levelhub::device::{DeviceApi, DeviceMonitor};
use levelhub::logger;
use levelhub::orientation::{cardinal_direction, process};
use levelhub::rate::{HealthWatch, LinkHealth};
use levelhub::stream::{StreamClient, StreamConfig};
use levelhub::types::{AngleRange, ConnectionState, DeviceSettings, DeviceStatus, RawReading};
use levelhub::utils::format_timestamp;

/// 同步消费者：每 5 帧输出一次最新姿态，超出水平范围时告警
fn run_consumer(
    readings: Receiver<Arc<RawReading>>,
    level_range: AngleRange,
    shutdown_signal: Arc<AtomicBool>,
) {
    let mut latest: Option<Arc<RawReading>> = None;
    let mut received = 0u64;

    while !shutdown_signal.load(Ordering::Relaxed) {
        match readings.recv_timeout(Duration::from_millis(200)) {
            Ok(reading) => {
                received += 1;
                latest = Some(reading);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Reading channel disconnected, consumer exiting");
                break;
            }
        }

        if received >= 5 {
            if let Some(reading) = latest.take() {
                let angles = process(&reading);
                info!(
                    "pitch {:.1}° roll {:.1}° heading {:.2}° ({}) tilt-comp {:.2}° |a| {:.2} m/s², time: {}",
                    angles.pitch,
                    angles.roll,
                    angles.heading,
                    cardinal_direction(angles.heading),
                    angles.tilt_compensated_heading,
                    angles.magnitude,
                    format_timestamp(reading.timestamp)
                );
                if !level_range.contains(angles.pitch) || !level_range.contains(angles.roll) {
                    warn!(
                        "Tilt outside level range [{:.1}°, {:.1}°]",
                        level_range.min, level_range.max
                    );
                }
            }
            received = 0;
        }
    }
}

async fn watch_link(mut state_rx: watch::Receiver<ConnectionState>, low_rate_threshold: u32) {
    let mut health_watch = HealthWatch::new(low_rate_threshold);
    while state_rx.changed().await.is_ok() {
        let state = state_rx.borrow_and_update().clone();

        if state.is_exhausted() {
            error!("{}", state.last_error.as_deref().unwrap_or("Connection lost"));
        }
        match health_watch.update(&state) {
            Some(LinkHealth::LowRate) => warn!(
                "Low message rate detected ({} msg/s)",
                state.message_rate_per_second
            ),
            Some(LinkHealth::Normal) => info!("Message rate {} msg/s", state.message_rate_per_second),
            Some(LinkHealth::NoData) | None => {}
        }
    }
}

async fn watch_device(mut status_rx: watch::Receiver<DeviceStatus>) {
    let mut reachable = None;
    while status_rx.changed().await.is_ok() {
        let status = *status_rx.borrow_and_update();
        if reachable != Some(status.reachable) {
            if status.reachable {
                info!(
                    "Device online, battery {:.0}% ({:.2} V)",
                    status.battery.percentage, status.battery.voltage
                );
            } else {
                warn!("Device offline");
            }
            reachable = Some(status.reachable);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok(); // 加载 .env 文件
    logger::init_logger();
    info!("Application starting");

    let config = AppConfig::from_env()?;
    let stream_config = StreamConfig::from_app_config(&config)?;
    let api = DeviceApi::from_config(&config)?;
    info!("Device stream: {}, API: {}", stream_config.url, api.base_url());

    let settings = match api.settings().await {
        Ok(settings) => {
            info!("Settings loaded: {:?}", settings);
            settings
        }
        Err(e) => {
            warn!("Failed to load settings: {}", e);
            DeviceSettings::default()
        }
    };
    let level_range = settings.level_range;

    let (reading_sender, reading_receiver) = bounded(config.channels.reading_channel_capacity);
    let shutdown_signal = Arc::new(AtomicBool::new(false));

    let consumer_shutdown = Arc::clone(&shutdown_signal);
    let consumer_handle = thread::spawn(move || run_consumer(reading_receiver, level_range, consumer_shutdown));

    let client = StreamClient::spawn_with_sink(stream_config, reading_sender);
    client.start();

    let monitor = DeviceMonitor::spawn(api, Duration::from_secs(config.health.poll_interval_secs));
    let link_task = tokio::spawn(watch_link(client.subscribe_state(), config.health.low_rate_threshold));
    let device_task = tokio::spawn(watch_device(monitor.subscribe()));

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");

    monitor.stop();
    device_task.abort();
    client.shutdown().await;
    link_task.abort();

    shutdown_signal.store(true, Ordering::Relaxed);
    match consumer_handle.join() {
        Ok(()) => info!("Consumer thread shut down gracefully"),
        Err(e) => error!("Consumer thread panicked: {:?}", e),
    }

    Ok(())
}
