use serde::Serialize;

use crate::types::ConnectionState;

/// 消息速率统计
///
/// 每接受一帧计数一次，距上次输出满一个窗口（默认 1000 ms）时输出计数并清零。
/// 这是按窗口采样的近似速率，只用于区分链路正常 / 降级。
#[derive(Debug, Clone)]
pub struct RateTracker {
    window_ms: i64,
    count: u32,
    last_emit_ms: i64,
}

impl RateTracker {
    pub fn new(window_ms: u64, now_ms: i64) -> Self {
        Self {
            window_ms: window_ms as i64,
            count: 0,
            last_emit_ms: now_ms,
        }
    }

    /// 记录一帧；窗口到期时返回新的速率
    pub fn record(&mut self, now_ms: i64) -> Option<u32> {
        self.count += 1;
        if now_ms - self.last_emit_ms >= self.window_ms {
            let rate = self.count;
            self.count = 0;
            self.last_emit_ms = now_ms;
            Some(rate)
        } else {
            None
        }
    }
}

/// 链路健康分级
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHealth {
    NoData,
    LowRate,
    Normal,
}

impl LinkHealth {
    /// 速率为 0 视为没有数据，低于阈值视为降级
    pub fn classify(rate: u32, low_rate_threshold: u32) -> Self {
        if rate == 0 {
            LinkHealth::NoData
        } else if rate < low_rate_threshold {
            LinkHealth::LowRate
        } else {
            LinkHealth::Normal
        }
    }
}

/// 只在健康等级变化时报告；链路断开后重置，重连时重新报告
#[derive(Debug, Clone)]
pub struct HealthWatch {
    low_rate_threshold: u32,
    last: LinkHealth,
}

impl HealthWatch {
    pub fn new(low_rate_threshold: u32) -> Self {
        Self {
            low_rate_threshold,
            last: LinkHealth::NoData,
        }
    }

    pub fn update(&mut self, state: &ConnectionState) -> Option<LinkHealth> {
        if !state.connected {
            self.last = LinkHealth::NoData;
            return None;
        }
        let health = LinkHealth::classify(state.message_rate_per_second, self.low_rate_threshold);
        if health == self.last {
            return None;
        }
        self.last = health;
        Some(health)
    }
}
