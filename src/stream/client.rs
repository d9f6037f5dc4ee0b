use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};

use crate::config::{AppConfig, ConfigError};
use crate::orientation;
use crate::stream::backoff::ReconnectPolicy;
use crate::stream::endpoint::DeviceEndpoint;
use crate::stream::machine::{ConnectionId, LinkCommand, LinkEvent, LinkMachine};
use crate::stream::transport::{Connection, Connector, TransportEvent, WsConnector};
use crate::types::{ConnectionState, ProcessedOrientation, RawReading};
use crate::utils::now_millis;

/// 流客户端配置
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub policy: ReconnectPolicy,
    pub rate_window_ms: u64,
}

impl StreamConfig {
    pub fn new(url: &str, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.to_string(),
            policy,
            rate_window_ms: 1000,
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let endpoint = DeviceEndpoint::from_config(&config.device)?;
        Ok(Self {
            url: endpoint.stream_url(),
            policy: ReconnectPolicy::from(&config.reconnect),
            rate_window_ms: config.health.rate_window_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Start,
    Stop,
    Reconnect,
    Shutdown,
}

/// 设备数据流客户端
///
/// 后台任务独占连接、重连定时器和状态机；这里只保存控制通道和
/// 各快照的 watch 接收端。可以同时创建多个互不影响的实例。
pub struct StreamClient {
    control_tx: mpsc::UnboundedSender<Control>,
    reading_rx: watch::Receiver<Option<Arc<RawReading>>>,
    processed_rx: watch::Receiver<Option<ProcessedOrientation>>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl StreamClient {
    /// 使用 WebSocket 连接；创建后需调用 `start()`
    pub fn spawn(config: StreamConfig) -> Self {
        Self::spawn_with(config, WsConnector, None)
    }

    /// 额外把每条新读数推送给同步消费者
    pub fn spawn_with_sink(config: StreamConfig, sink: Sender<Arc<RawReading>>) -> Self {
        Self::spawn_with(config, WsConnector, Some(sink))
    }

    pub fn spawn_with<C: Connector>(
        config: StreamConfig,
        connector: C,
        sink: Option<Sender<Arc<RawReading>>>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (reading_tx, reading_rx) = watch::channel(None);
        let (processed_tx, processed_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());

        let driver = Driver {
            machine: LinkMachine::new(config.policy, config.rate_window_ms, now_millis()),
            connector,
            url: config.url,
            pending: None,
            live: None,
            retry: None,
            reading_tx,
            processed_tx,
            state_tx,
            sink,
        };
        let task = tokio::spawn(driver.run(control_rx));

        Self {
            control_tx,
            reading_rx,
            processed_rx,
            state_rx,
            task,
        }
    }

    fn send(&self, control: Control) {
        if self.control_tx.send(control).is_err() {
            warn!("Stream driver is gone, {:?} ignored", control);
        }
    }

    pub fn start(&self) {
        self.send(Control::Start);
    }

    pub fn stop(&self) {
        self.send(Control::Stop);
    }

    /// 手动重连，跳过退避
    pub fn reconnect(&self) {
        self.send(Control::Reconnect);
    }

    pub fn latest_reading(&self) -> Option<Arc<RawReading>> {
        self.reading_rx.borrow().clone()
    }

    /// 由最新读数即时计算
    pub fn processed(&self) -> Option<ProcessedOrientation> {
        self.latest_reading().map(|reading| orientation::process(&reading))
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_readings(&self) -> watch::Receiver<Option<Arc<RawReading>>> {
        self.reading_rx.clone()
    }

    pub fn subscribe_processed(&self) -> watch::Receiver<Option<ProcessedOrientation>> {
        self.processed_rx.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// 停止并等待后台任务退出
    pub async fn shutdown(self) {
        self.send(Control::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Stream driver task failed: {}", e);
        }
    }
}

struct Driver<C> {
    machine: LinkMachine,
    connector: C,
    url: String,
    pending: Option<(ConnectionId, BoxFuture<'static, Result<Connection, String>>)>,
    live: Option<(ConnectionId, Connection)>,
    retry: Option<Pin<Box<Sleep>>>,
    reading_tx: watch::Sender<Option<Arc<RawReading>>>,
    processed_tx: watch::Sender<Option<ProcessedOrientation>>,
    state_tx: watch::Sender<ConnectionState>,
    sink: Option<Sender<Arc<RawReading>>>,
}

async fn connect_finished(
    slot: &mut Option<(ConnectionId, BoxFuture<'static, Result<Connection, String>>)>,
) -> (ConnectionId, Result<Connection, String>) {
    match slot {
        Some((id, attempt)) => (*id, attempt.as_mut().await),
        None => pending().await,
    }
}

async fn next_event(slot: &mut Option<(ConnectionId, Connection)>) -> (ConnectionId, Option<TransportEvent>) {
    match slot {
        Some((id, connection)) => (*id, connection.next_event().await),
        None => pending().await,
    }
}

async fn retry_elapsed(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

impl<C: Connector> Driver<C> {
    async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) {
        loop {
            let events = tokio::select! {
                control = control_rx.recv() => {
                    let commands = match control {
                        Some(Control::Start) => self.machine.start(),
                        Some(Control::Stop) => self.machine.stop(),
                        Some(Control::Reconnect) => self.machine.reconnect(),
                        Some(Control::Shutdown) | None => {
                            let commands = self.machine.stop();
                            self.execute(commands);
                            self.publish();
                            break;
                        }
                    };
                    self.execute(commands);
                    Vec::new()
                }
                (id, result) = connect_finished(&mut self.pending) => {
                    self.pending = None;
                    self.on_connect_finished(id, result)
                }
                (id, event) = next_event(&mut self.live) => self.on_transport_event(id, event),
                _ = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    vec![LinkEvent::RetryElapsed]
                }
            };

            for event in events {
                let commands = self.machine.handle(event, now_millis());
                self.execute(commands);
            }
            self.publish();
        }
        info!("Stream driver stopped");
    }

    fn on_connect_finished(&mut self, id: ConnectionId, result: Result<Connection, String>) -> Vec<LinkEvent> {
        match result {
            Ok(connection) => {
                if self.machine.current() == Some(id) {
                    self.live = Some((id, connection));
                } else {
                    tokio::spawn(connection.close());
                }
                vec![LinkEvent::Opened(id)]
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.url, e);
                vec![LinkEvent::TransportError(id, e), LinkEvent::Closed(id)]
            }
        }
    }

    fn on_transport_event(&mut self, id: ConnectionId, event: Option<TransportEvent>) -> Vec<LinkEvent> {
        match event {
            Some(TransportEvent::Text(text)) => vec![LinkEvent::Frame(id, text)],
            Some(TransportEvent::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => vec![LinkEvent::Frame(id, text)],
                Err(e) => vec![LinkEvent::BadFrame(id, e.to_string())],
            },
            // 错误之后必然关闭
            Some(TransportEvent::Error(e)) => {
                self.live = None;
                vec![LinkEvent::TransportError(id, e), LinkEvent::Closed(id)]
            }
            Some(TransportEvent::Closed { code, reason }) => {
                info!("WebSocket closed (code: {:?}, reason: {})", code, reason);
                self.live = None;
                vec![LinkEvent::Closed(id)]
            }
            None => {
                info!("WebSocket stream ended");
                self.live = None;
                vec![LinkEvent::Closed(id)]
            }
        }
    }

    fn execute(&mut self, commands: Vec<LinkCommand>) {
        for command in commands {
            match command {
                LinkCommand::Connect(id) => {
                    info!("Connecting to WebSocket: {}", self.url);
                    self.pending = Some((id, self.connector.connect(&self.url)));
                }
                LinkCommand::Disconnect(id) => {
                    if matches!(self.pending, Some((pending_id, _)) if pending_id == id) {
                        self.pending = None;
                    }
                    if matches!(self.live, Some((live_id, _)) if live_id == id) {
                        if let Some((_, connection)) = self.live.take() {
                            tokio::spawn(connection.close());
                        }
                    }
                }
                LinkCommand::ScheduleRetry(delay) => {
                    self.retry = Some(Box::pin(sleep(delay)));
                }
                LinkCommand::CancelRetry => {
                    self.retry = None;
                }
            }
        }
    }

    fn publish(&mut self) {
        let state = self.machine.state();
        self.state_tx.send_if_modified(|published| {
            if *published != *state {
                *published = state.clone();
                true
            } else {
                false
            }
        });

        let latest = match self.machine.latest() {
            Some(latest) => Arc::clone(latest),
            None => return,
        };
        let changed = match self.reading_tx.borrow().as_ref() {
            Some(published) => !Arc::ptr_eq(published, &latest),
            None => true,
        };
        if !changed {
            return;
        }

        self.processed_tx.send_replace(Some(orientation::process(&latest)));
        self.reading_tx.send_replace(Some(Arc::clone(&latest)));

        let disconnected = match &self.sink {
            Some(sink) => match sink.try_send(latest) {
                Ok(()) => false,
                Err(TrySendError::Full(_)) => {
                    debug!("Reading sink full, dropping reading");
                    false
                }
                Err(TrySendError::Disconnected(_)) => true,
            },
            None => false,
        };
        if disconnected {
            debug!("Reading sink disconnected");
            self.sink = None;
        }
    }
}
