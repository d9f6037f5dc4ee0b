use serde::{Deserialize, Serialize};

/// 由 RawReading 推导出的姿态结果，供界面直接显示
///
/// 各字段已按显示精度取整：pitch / roll 保留 1 位小数，其余保留 2 位。
/// 两个航向角恒在 `[0, 360)` 内。加速度模长为 0 时 `gravity_vector` 为 NaN，
/// 其它字段不受影响。
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedOrientation {
    pub pitch: f64,
    pub roll: f64,
    pub heading: f64,
    pub magnitude: f64,
    pub tilt_compensated_heading: f64,
    pub gravity_vector: f64,
    pub horizontal_acceleration: f64,
}
