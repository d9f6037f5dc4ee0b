use serde::Serialize;

/// 连接状态机所处阶段
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LinkPhase {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    WaitingToRetry,
    Exhausted,
}

impl LinkPhase {
    /// 已有连接在建立中或已打开
    pub fn is_active(&self) -> bool {
        matches!(self, LinkPhase::Connecting | LinkPhase::Open | LinkPhase::Closing)
    }
}

/// 对外发布的连接状态快照
#[derive(Serialize, Clone, Debug, PartialEq, Default)]
pub struct ConnectionState {
    pub connected: bool,
    pub last_error: Option<String>,
    pub reconnect_attempt: u32,
    pub message_rate_per_second: u32,
    pub phase: LinkPhase,
}

impl ConnectionState {
    /// 重试次数耗尽，需要手动重连
    pub fn is_exhausted(&self) -> bool {
        self.phase == LinkPhase::Exhausted
    }
}
