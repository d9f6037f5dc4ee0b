use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, SinkExt, StreamExt};
use log::{debug, trace};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// 一条物理连接上发生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// 已建立的连接：事件流 + 关闭动作
pub struct Connection {
    events: BoxStream<'static, TransportEvent>,
    closer: BoxFuture<'static, ()>,
}

impl Connection {
    pub fn new(events: BoxStream<'static, TransportEvent>, closer: BoxFuture<'static, ()>) -> Self {
        Self { events, closer }
    }

    /// 流结束返回 None
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.next().await
    }

    /// 丢弃事件流并返回关闭动作，调用方负责执行
    pub fn close(self) -> BoxFuture<'static, ()> {
        self.closer
    }
}

/// 建立连接的方式，便于替换成测试用的假连接
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, String>>;
}

/// WebSocket 连接（tokio-tungstenite）
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

fn map_message(message: Result<Message, tokio_tungstenite::tungstenite::Error>) -> Option<TransportEvent> {
    match message {
        Ok(Message::Text(text)) => Some(TransportEvent::Text(text)),
        Ok(Message::Binary(data)) => Some(TransportEvent::Binary(data)),
        Ok(Message::Close(frame)) => {
            let (code, reason) = match frame {
                Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                None => (None, String::new()),
            };
            Some(TransportEvent::Closed { code, reason })
        }
        Ok(other) => {
            trace!("Ignoring control frame: {:?}", other);
            None
        }
        Err(e) => Some(TransportEvent::Error(e.to_string())),
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, String>> {
        let url = url.to_string();
        async move {
            let (socket, response) = connect_async(url.as_str()).await.map_err(|e| e.to_string())?;
            debug!("WebSocket handshake with {} finished: {}", url, response.status());

            let (mut sink, stream) = socket.split();
            let events = stream
                .filter_map(|message| async move { map_message(message) })
                .boxed();
            let closer = async move {
                if let Err(e) = sink.close().await {
                    debug!("WebSocket close failed: {}", e);
                }
            }
            .boxed();

            Ok(Connection::new(events, closer))
        }
        .boxed()
    }
}
