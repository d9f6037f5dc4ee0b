use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::rate::RateTracker;
use crate::stream::backoff::ReconnectPolicy;
use crate::stream::decoder::{decode_frame, DecodeError};
use crate::types::{ConnectionState, LinkPhase, RawReading};

pub const TRANSPORT_ERROR: &str = "Connection error";
pub const EXHAUSTED_ERROR: &str =
    "Connection lost. Maximum reconnection attempts reached. Reconnect manually to retry.";

/// 一次物理连接尝试的编号，用于丢弃过期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// 驱动层上报给状态机的事件
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Opened(ConnectionId),
    Frame(ConnectionId, String),
    /// 无法按 UTF-8 解释的二进制帧
    BadFrame(ConnectionId, String),
    TransportError(ConnectionId, String),
    Closed(ConnectionId),
    RetryElapsed,
}

/// 状态机要求驱动层执行的动作
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    Connect(ConnectionId),
    Disconnect(ConnectionId),
    ScheduleRetry(Duration),
    CancelRetry,
}

/// 连接状态机
///
/// 不做任何 IO：驱动层把连接事件、定时器到期、外部控制转成方法调用，
/// 再执行返回的 [`LinkCommand`]。所有过期事件（编号不匹配或阶段不对）
/// 都被忽略，`stop()` 之后不会再有状态变化。
pub struct LinkMachine {
    policy: ReconnectPolicy,
    phase: LinkPhase,
    current: Option<ConnectionId>,
    next_id: u64,
    state: ConnectionState,
    latest: Option<Arc<RawReading>>,
    rate: RateTracker,
}

impl LinkMachine {
    pub fn new(policy: ReconnectPolicy, rate_window_ms: u64, now_ms: i64) -> Self {
        Self {
            policy,
            phase: LinkPhase::Idle,
            current: None,
            next_id: 0,
            state: ConnectionState::default(),
            latest: None,
            rate: RateTracker::new(rate_window_ms, now_ms),
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn latest(&self) -> Option<&Arc<RawReading>> {
        self.latest.as_ref()
    }

    fn set_phase(&mut self, phase: LinkPhase) {
        self.phase = phase;
        self.state.phase = phase;
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    fn connect(&mut self, commands: &mut Vec<LinkCommand>) {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.current = Some(id);
        self.set_phase(LinkPhase::Connecting);
        commands.push(LinkCommand::Connect(id));
    }

    /// 已有连接在建立中或已打开时什么也不做
    pub fn start(&mut self) -> Vec<LinkCommand> {
        let mut commands = Vec::new();
        if self.phase.is_active() {
            debug!("start ignored, link is {:?}", self.phase);
            return commands;
        }
        if self.phase == LinkPhase::WaitingToRetry {
            commands.push(LinkCommand::CancelRetry);
        }
        self.connect(&mut commands);
        commands
    }

    /// 取消重连定时器并关闭连接，之后到达的事件全部忽略
    pub fn stop(&mut self) -> Vec<LinkCommand> {
        let mut commands = vec![LinkCommand::CancelRetry];
        if let Some(id) = self.current.take() {
            commands.push(LinkCommand::Disconnect(id));
        }
        self.state.connected = false;
        self.set_phase(LinkPhase::Idle);
        commands
    }

    /// 手动重连：计数清零，跳过退避立即连接
    pub fn reconnect(&mut self) -> Vec<LinkCommand> {
        let mut commands = vec![LinkCommand::CancelRetry];
        if let Some(id) = self.current.take() {
            commands.push(LinkCommand::Disconnect(id));
        }
        self.state.connected = false;
        self.state.reconnect_attempt = 0;
        self.connect(&mut commands);
        commands
    }

    pub fn handle(&mut self, event: LinkEvent, now_ms: i64) -> Vec<LinkCommand> {
        let mut commands = Vec::new();
        match event {
            LinkEvent::Opened(id) => {
                if self.is_current(id) && self.phase == LinkPhase::Connecting {
                    info!("Stream connected (connection {})", id.0);
                    self.set_phase(LinkPhase::Open);
                    self.state.connected = true;
                    self.state.last_error = None;
                    self.state.reconnect_attempt = 0;
                }
            }
            LinkEvent::Frame(id, text) => {
                if self.is_current(id) && self.phase == LinkPhase::Open {
                    self.on_frame(decode_frame(&text, now_ms), &text, now_ms);
                }
            }
            LinkEvent::BadFrame(id, reason) => {
                if self.is_current(id) && self.phase == LinkPhase::Open {
                    warn!("Dropping undecodable frame: {}", reason);
                }
            }
            LinkEvent::TransportError(id, message) => {
                if self.is_current(id) && self.phase.is_active() {
                    error!("Stream transport error: {}", message);
                    self.state.last_error = Some(TRANSPORT_ERROR.to_string());
                    self.set_phase(LinkPhase::Closing);
                }
            }
            LinkEvent::Closed(id) => {
                if self.is_current(id) && self.phase.is_active() {
                    self.current = None;
                    self.state.connected = false;
                    self.on_closed(&mut commands);
                }
            }
            LinkEvent::RetryElapsed => {
                if self.phase == LinkPhase::WaitingToRetry {
                    self.state.reconnect_attempt += 1;
                    self.connect(&mut commands);
                }
            }
        }
        commands
    }

    fn on_frame(&mut self, decoded: Result<RawReading, DecodeError>, text: &str, now_ms: i64) {
        match decoded {
            Ok(reading) => {
                self.latest = Some(Arc::new(reading));
                self.state.last_error = None;
                if let Some(rate) = self.rate.record(now_ms) {
                    self.state.message_rate_per_second = rate;
                }
            }
            Err(e) => warn!("Invalid sensor frame: {} (raw: {})", e, text),
        }
    }

    fn on_closed(&mut self, commands: &mut Vec<LinkCommand>) {
        let attempt = self.state.reconnect_attempt;
        if self.policy.allows(attempt) {
            let delay = self.policy.delay_for(attempt);
            info!(
                "Stream closed, reconnecting in {}ms (attempt {}/{})",
                delay.as_millis(),
                attempt + 1,
                self.policy.max_attempts
            );
            self.set_phase(LinkPhase::WaitingToRetry);
            commands.push(LinkCommand::ScheduleRetry(delay));
        } else {
            error!(
                "Stream closed, giving up after {} reconnection attempts",
                self.policy.max_attempts
            );
            self.state.last_error = Some(EXHAUSTED_ERROR.to_string());
            self.set_phase(LinkPhase::Exhausted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{"accelerometer": {"x": 0, "y": 0, "z": 9.8}, "magnetometer": {"x": 20, "y": 0, "z": 0}, "pitch": 0.4, "roll": -0.2, "timestamp": 1000}"#;

    fn machine() -> LinkMachine {
        LinkMachine::new(ReconnectPolicy::default(), 1000, 0)
    }

    fn connect_id(commands: &[LinkCommand]) -> ConnectionId {
        commands
            .iter()
            .find_map(|c| match c {
                LinkCommand::Connect(id) => Some(*id),
                _ => None,
            })
            .expect("no connect command")
    }

    fn open(machine: &mut LinkMachine) -> ConnectionId {
        let id = connect_id(&machine.start());
        machine.handle(LinkEvent::Opened(id), 0);
        id
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut m = machine();
        let commands = m.start();
        assert_eq!(commands, vec![LinkCommand::Connect(ConnectionId(1))]);
        assert_eq!(m.phase(), LinkPhase::Connecting);

        assert!(m.start().is_empty());
        m.handle(LinkEvent::Opened(ConnectionId(1)), 0);
        assert!(m.start().is_empty());
        assert_eq!(m.current(), Some(ConnectionId(1)));
    }

    #[test]
    fn test_open_resets_state() {
        let mut m = machine();
        let id = connect_id(&m.start());
        m.handle(LinkEvent::TransportError(id, "refused".into()), 0);
        m.handle(LinkEvent::Closed(id), 0);
        m.handle(LinkEvent::RetryElapsed, 2000);
        assert_eq!(m.state().reconnect_attempt, 1);

        let id = m.current().unwrap();
        m.handle(LinkEvent::Opened(id), 2100);
        let state = m.state();
        assert!(state.connected);
        assert_eq!(state.last_error, None);
        assert_eq!(state.reconnect_attempt, 0);
        assert_eq!(state.phase, LinkPhase::Open);
    }

    #[test]
    fn test_frame_publishes_reading() {
        let mut m = machine();
        let id = open(&mut m);
        m.handle(LinkEvent::Frame(id, FRAME.to_string()), 10);

        let reading = m.latest().unwrap();
        assert_eq!(reading.pitch, 0.4);
        assert_eq!(reading.accelerometer.z, 9.8);
        assert_eq!(reading.timestamp, 1000);
    }

    #[test]
    fn test_bad_frame_keeps_previous_reading() {
        let mut m = machine();
        let id = open(&mut m);
        m.handle(LinkEvent::Frame(id, FRAME.to_string()), 10);
        let before = Arc::clone(m.latest().unwrap());

        m.handle(LinkEvent::Frame(id, "{garbage".to_string()), 20);
        assert!(Arc::ptr_eq(m.latest().unwrap(), &before));
        assert!(m.state().connected);
        assert_eq!(m.state().last_error, None);

        m.handle(LinkEvent::Frame(id, r#"{"roll": 1}"#.to_string()), 30);
        assert!(Arc::ptr_eq(m.latest().unwrap(), &before));

        let next = FRAME.replace("\"timestamp\": 1000", "\"timestamp\": 2000");
        m.handle(LinkEvent::Frame(id, next), 40);
        assert_eq!(m.latest().unwrap().timestamp, 2000);
    }

    #[test]
    fn test_valid_frame_clears_error() {
        let mut m = machine();
        let id = open(&mut m);
        m.state.last_error = Some("stale".to_string());
        m.handle(LinkEvent::Frame(id, FRAME.to_string()), 10);
        assert_eq!(m.state().last_error, None);
    }

    #[test]
    fn test_message_rate() {
        let mut m = machine();
        let id = open(&mut m);
        for t in (100..=1000).step_by(100) {
            m.handle(LinkEvent::Frame(id, FRAME.to_string()), t);
        }
        assert_eq!(m.state().message_rate_per_second, 10);

        // 解码失败的帧不计数
        m.handle(LinkEvent::Frame(id, "oops".to_string()), 1500);
        m.handle(LinkEvent::Frame(id, FRAME.to_string()), 2000);
        assert_eq!(m.state().message_rate_per_second, 1);
    }

    #[test]
    fn test_error_then_close_schedules_retry() {
        let mut m = machine();
        let id = open(&mut m);

        m.handle(LinkEvent::TransportError(id, "reset".into()), 0);
        assert_eq!(m.phase(), LinkPhase::Closing);
        assert_eq!(m.state().last_error.as_deref(), Some(TRANSPORT_ERROR));

        let commands = m.handle(LinkEvent::Closed(id), 0);
        assert_eq!(commands, vec![LinkCommand::ScheduleRetry(Duration::from_millis(2000))]);
        assert_eq!(m.phase(), LinkPhase::WaitingToRetry);
        assert!(!m.state().connected);
    }

    #[test]
    fn test_backoff_sequence_and_exhaustion() {
        let mut m = machine();
        let mut id = connect_id(&m.start());
        let mut delays = Vec::new();

        loop {
            let commands = m.handle(LinkEvent::Closed(id), 0);
            match commands.as_slice() {
                [LinkCommand::ScheduleRetry(delay)] => delays.push(*delay),
                [] => break,
                other => panic!("unexpected commands {:?}", other),
            }
            id = connect_id(&m.handle(LinkEvent::RetryElapsed, 0));
        }

        let expected_ms = [2000.0, 3000.0, 4500.0, 6750.0, 10125.0, 15187.5, 22781.25, 30000.0, 30000.0, 30000.0];
        assert_eq!(delays.len(), expected_ms.len());
        for (delay, want) in delays.iter().zip(expected_ms) {
            assert_eq!(delay.as_secs_f64() * 1000.0, want);
        }

        assert_eq!(m.phase(), LinkPhase::Exhausted);
        assert_eq!(m.state().reconnect_attempt, 10);
        assert_eq!(m.state().last_error.as_deref(), Some(EXHAUSTED_ERROR));
        assert!(m.state().is_exhausted());

        // 不会再有第 11 次
        assert!(m.handle(LinkEvent::RetryElapsed, 0).is_empty());
        assert_eq!(m.phase(), LinkPhase::Exhausted);
    }

    #[test]
    fn test_manual_reconnect_after_exhaustion() {
        let policy = ReconnectPolicy {
            max_attempts: 1,
            ..ReconnectPolicy::default()
        };
        let mut m = LinkMachine::new(policy, 1000, 0);
        let id = connect_id(&m.start());
        m.handle(LinkEvent::Closed(id), 0);
        let id = connect_id(&m.handle(LinkEvent::RetryElapsed, 0));
        assert!(m.handle(LinkEvent::Closed(id), 0).is_empty());
        assert!(m.state().is_exhausted());

        let commands = m.reconnect();
        assert_eq!(commands[0], LinkCommand::CancelRetry);
        let id = connect_id(&commands);
        assert_eq!(m.state().reconnect_attempt, 0);
        assert_eq!(m.phase(), LinkPhase::Connecting);

        m.handle(LinkEvent::Opened(id), 0);
        assert!(m.state().connected);
        assert_eq!(m.state().last_error, None);
    }

    #[test]
    fn test_manual_reconnect_replaces_live_connection() {
        let mut m = machine();
        let old = open(&mut m);

        let commands = m.reconnect();
        assert!(commands.contains(&LinkCommand::Disconnect(old)));
        let new = connect_id(&commands);
        assert_ne!(old, new);

        // 旧连接的关闭事件不触发重连
        assert!(m.handle(LinkEvent::Closed(old), 0).is_empty());
        assert_eq!(m.phase(), LinkPhase::Connecting);
    }

    #[test]
    fn test_start_while_waiting_cancels_timer() {
        let mut m = machine();
        let id = open(&mut m);
        m.handle(LinkEvent::Closed(id), 0);

        let commands = m.start();
        assert_eq!(commands[0], LinkCommand::CancelRetry);
        assert!(matches!(commands[1], LinkCommand::Connect(_)));
        assert_eq!(m.state().reconnect_attempt, 0);
    }

    #[test]
    fn test_no_mutation_after_stop() {
        let mut m = machine();
        let id = open(&mut m);
        m.handle(LinkEvent::Frame(id, FRAME.to_string()), 10);

        let commands = m.stop();
        assert_eq!(commands, vec![LinkCommand::CancelRetry, LinkCommand::Disconnect(id)]);
        let state = m.state().clone();
        let reading = Arc::clone(m.latest().unwrap());

        let late = FRAME.replace("0.4", "7.0");
        assert!(m.handle(LinkEvent::Frame(id, late), 20).is_empty());
        assert!(m.handle(LinkEvent::TransportError(id, "late".into()), 30).is_empty());
        assert!(m.handle(LinkEvent::Closed(id), 40).is_empty());
        assert!(m.handle(LinkEvent::Opened(id), 50).is_empty());
        assert!(m.handle(LinkEvent::RetryElapsed, 60).is_empty());

        assert_eq!(m.state(), &state);
        assert!(Arc::ptr_eq(m.latest().unwrap(), &reading));
        assert_eq!(m.phase(), LinkPhase::Idle);
    }

    #[test]
    fn test_stop_while_waiting_to_retry() {
        let mut m = machine();
        let id = open(&mut m);
        m.handle(LinkEvent::Closed(id), 0);
        assert_eq!(m.phase(), LinkPhase::WaitingToRetry);

        assert_eq!(m.stop(), vec![LinkCommand::CancelRetry]);
        assert!(m.handle(LinkEvent::RetryElapsed, 0).is_empty());
        assert_eq!(m.phase(), LinkPhase::Idle);
    }
}
