use serde::{Deserialize, Serialize};

/// 三轴向量（加速度计 / 磁力计共用）
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 设备推送的一帧原始读数（已经过清洗）
///
/// 由解码器为每一帧新建，发布后不再修改；下一帧到达时被整体替换。
/// `pitch` / `roll` 是固件自己算出的角度，方向计算不使用它们。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RawReading {
    pub accelerometer: Axes,
    pub magnetometer: Axes,
    pub pitch: f64,
    pub roll: f64,
    pub timestamp: i64, // 毫秒时间戳
}

impl RawReading {
    pub fn new(accelerometer: Axes, magnetometer: Axes, pitch: f64, roll: f64, timestamp: i64) -> Self {
        Self {
            accelerometer,
            magnetometer,
            pitch,
            roll,
            timestamp,
        }
    }

    /// 所有数值字段都是有限值
    pub fn is_finite(&self) -> bool {
        self.accelerometer.is_finite()
            && self.magnetometer.is_finite()
            && self.pitch.is_finite()
            && self.roll.is_finite()
    }
}
